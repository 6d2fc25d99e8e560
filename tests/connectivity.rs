use zonal_data::prelude::*;

fn fe_dataset(session: &Session) -> Dataset<'_> {
    let ds = session.create_dataset("fe");
    ds.add_variable("x").unwrap();
    ds
}

// Unit square split along its diagonal: element 0 = (0, 1, 2), element 1 = (0, 2, 3).
fn square_edges() -> (Vec<Vec<usize>>, Vec<[Option<usize>; 2]>) {
    let faces = vec![vec![0, 1], vec![1, 2], vec![2, 0], vec![2, 3], vec![3, 0]];
    let elements = vec![
        [Some(0), None],
        [Some(0), None],
        [Some(0), Some(1)],
        [Some(1), None],
        [Some(1), None],
    ];
    (faces, elements)
}

#[test]
fn triangle_nodemap_shape_and_reverse_lookup() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let z = ds.add_fe_zone(ElementType::Triangle, "tri", 4, 2)?;
    let nm = z.nodemap();
    nm.set_all(&[vec![0, 1, 2], vec![1, 3, 2]])?;
    assert_eq!(nm.shape()?, (2, 3));
    assert_eq!(nm.num_elements_using_node(1)?, 2);
    assert_eq!(nm.elements_using_node(0)?, vec![0]);
    assert_eq!(nm.num_elements_using_node(3)?, 1);
    Ok(())
}

#[test]
fn nodemap_assignment_stages_until_finish() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let nm = ds.add_fe_zone(ElementType::Quad, "q", 6, 2)?.nodemap();
    nm.set_flat(&[0, 1, 4, 3, 1, 2, 5, 4])?;

    let tx = nm.assignment()?;
    nm.set(0, &[3, 4, 1, 0])?;
    tx.set(1, &[4, 5, 2, 1])?;
    assert_eq!(nm.get(0)?, vec![0, 1, 4, 3]);
    assert!(matches!(nm.assignment(), Err(DataError::AssignmentOpen { .. })));
    tx.finish()?;
    assert_eq!(nm.to_vec()?, vec![vec![3, 4, 1, 0], vec![4, 5, 2, 1]]);
    Ok(())
}

#[test]
fn dropped_nodemap_assignment_still_commits() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let nm = ds.add_fe_zone(ElementType::LineSeg, "l", 3, 2)?.nodemap();
    {
        let tx = nm.assignment()?;
        tx.set_all(&[vec![0, 1], vec![1, 2]])?;
    }
    assert_eq!(nm.to_flat()?, vec![0, 1, 1, 2]);
    Ok(())
}

#[test]
fn failed_nodemap_commit_keeps_unallocated_state() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let nm = ds.add_fe_zone(ElementType::Triangle, "tri", 3, 1)?.nodemap();
    let tx = nm.assignment()?;
    tx.set(0, &[0, 1, 3])?;
    let err = tx.finish().unwrap_err();
    assert!(matches!(err, DataError::CommitRejected { .. }));
    assert!(!nm.is_allocated()?);
    assert_eq!(nm.get(0), Err(DataError::NotAllocated("nodemap")));
    Ok(())
}

#[test]
fn nodemap_alloc_is_idempotent() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let nm = ds.add_fe_zone(ElementType::Tetra, "tet", 4, 1)?.nodemap();
    nm.alloc()?;
    assert_eq!(nm.to_flat()?, vec![0; 4]);
    nm.set(0, &[0, 1, 2, 3])?;
    nm.alloc()?;
    assert_eq!(nm.get(0)?, vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn nodemap_needs_a_classic_fe_zone() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let z = ds.add_ordered_zone("o", (2, 2, 1))?;
    let err = z.as_classic_fe().unwrap_err();
    assert!(matches!(err, DataError::WrongZoneType { .. }));
    assert_eq!(err.kind(), ErrorKind::Logic);
    Ok(())
}

#[test]
fn polygon_facemap_in_one_call() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let z = ds.add_poly_zone(PolytopeKind::Polygon, "square", 4, 2, 0)?;
    let fm = z.facemap();
    let (faces, elements) = square_edges();
    fm.set_mapping(&faces, &elements, &[])?;

    assert_eq!(z.num_faces()?, 5);
    assert_eq!(fm.num_face_nodes()?, 10);
    assert_eq!(fm.nodes(2)?, vec![2, 0]);
    assert_eq!(fm.left_element(2)?, Some(0));
    assert_eq!(fm.right_element(2)?, Some(1));
    assert_eq!(fm.right_element(0)?, None);
    assert_eq!(fm.element_faces(1)?, vec![2, 3, 4]);
    assert_eq!(fm.num_boundary_faces()?, 0);
    Ok(())
}

#[test]
fn polyhedron_facemap_phase_by_phase() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let z = ds.add_poly_zone(PolytopeKind::Polyhedron, "tet", 4, 1, 4)?;
    let fm = z.facemap();
    assert!(matches!(fm.assignment(), Err(DataError::NotAllocated(_))));

    fm.alloc(FacemapCapacity::new(4, 12))?;
    let tx = fm.assignment()?;
    assert!(matches!(
        tx.set_elements(&[Some(0); 4], &[None; 4]),
        Err(DataError::PhaseOrder { .. })
    ));
    tx.set_faces(&[vec![0, 1, 2], vec![0, 3, 1], vec![1, 3, 2], vec![2, 3, 0]])?;
    tx.set_elements(&[Some(0); 4], &[None; 4])?;
    tx.finish()?;

    assert_eq!(fm.num_faces()?, 4);
    assert_eq!(fm.num_nodes(1)?, 3);
    assert_eq!(fm.element_faces(0)?, vec![0, 1, 2, 3]);
    assert!(matches!(
        fm.alloc(FacemapCapacity::new(5, 15)),
        Err(DataError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn failed_facemap_commit_keeps_previous_mapping() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let z = ds.add_poly_zone(PolytopeKind::Polygon, "square", 4, 2, 0)?;
    let fm = z.facemap();
    let (faces, elements) = square_edges();
    fm.set_mapping(&faces, &elements, &[])?;

    let mut bad = elements.clone();
    bad[4] = [Some(1), Some(7)];
    let err = fm.set_mapping(&faces, &bad, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::System);
    assert_eq!(fm.right_element(4)?, None);
    assert_eq!(fm.num_faces()?, 5);
    Ok(())
}

#[test]
fn boundary_connections_point_into_other_zones() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let left = ds.add_poly_zone(PolytopeKind::Polygon, "left", 4, 2, 0)?;
    let right = ds.add_fe_zone(ElementType::Quad, "right", 4, 1)?;
    let (faces, elements) = square_edges();
    let boundary = [BoundaryFace {
        face: 1,
        connections: vec![(0, 1)],
    }];
    left.facemap().set_mapping(&faces, &elements, &boundary)?;
    let fm = left.facemap();
    assert_eq!(fm.num_boundary_faces()?, 1);
    assert_eq!(
        fm.boundary_connections(1)?,
        vec![BoundaryConnection {
            element: 0,
            zone: right.id(),
        }]
    );
    assert_eq!(fm.num_boundary_connections(0)?, 0);
    Ok(())
}

#[test]
fn global_neighbors_across_zones() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let options = |name: &str| {
        ZoneOptions::classic_fe(name, ElementType::Triangle, 3, 1)
            .face_neighbor_mode(FaceNeighborMode::GLOBAL_ONE_TO_ONE)
    };
    let a = ds.add_zone(options("a"))?;
    let b = ds.add_zone(options("b"))?;
    let fnb = a.face_neighbors()?;
    assert!(fnb.mode()?.is_global());

    let tx = fnb.assignment()?;
    tx.add_neighbors(0, 1, &[0], Some(&[1][..]), true)?;
    tx.add_neighbors(0, 2, &[0], Some(&[1][..]), false)?;
    tx.finish()?;

    assert_eq!(fnb.neighbors(0, 1)?, vec![Neighbor::global(0, b.id())]);
    assert!(fnb.is_obscured(0, 1, None)?);
    assert!(!fnb.is_obscured(0, 2, None)?);
    assert!(!fnb.is_obscured(0, 0, None)?);
    assert!(fnb.is_obscured(0, 1, Some(&[b.id()][..]))?);
    assert!(!fnb.is_obscured(0, 1, Some(&[a.id()][..]))?);
    assert!(fnb.neighbors(1, 0).is_err());
    Ok(())
}

#[test]
fn local_neighbors_from_flat_table() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let z = ds.add_fe_zone(ElementType::Triangle, "tri", 4, 2)?;
    let fnb = z.face_neighbors()?;
    fnb.set_local_neighbors(&[None, Some(1), None, Some(0), None, None])?;
    assert_eq!(fnb.neighbors(0, 1)?, vec![Neighbor::local(1)]);
    assert!(fnb.is_obscured(1, 0, None)?);
    assert_eq!(fnb.num_neighbors(1, 1)?, 0);
    assert!(matches!(
        fnb.set_local_neighbors(&[None; 5]),
        Err(DataError::LengthMismatch { expected: 6, found: 5 })
    ));
    Ok(())
}

#[test]
fn one_to_many_keeps_every_neighbor() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let z = ds.add_zone(
        ZoneOptions::ordered("o", (4, 1, 1)).face_neighbor_mode(FaceNeighborMode::LOCAL_ONE_TO_MANY),
    )?;
    let fnb = z.face_neighbors()?;
    let tx = fnb.assignment()?;
    tx.add_neighbors(0, 0, &[1, 2], None, false)?;
    tx.finish()?;
    assert_eq!(fnb.num_neighbors(0, 0)?, 2);
    Ok(())
}

#[test]
fn rejected_single_write_leaves_nodemap_unallocated() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let nm = ds.add_fe_zone(ElementType::Triangle, "tri", 3, 1)?.nodemap();
    let events = std::sync::Arc::new(std::sync::Mutex::new(0usize));
    let sink = events.clone();
    session.subscribe(move |_| *sink.lock().unwrap() += 1);

    let err = nm.set(0, &[0, 1]).unwrap_err();
    assert_eq!(err, DataError::LengthMismatch { expected: 3, found: 2 });
    assert!(nm.set(4, &[0, 1, 2]).is_err());
    assert!(!nm.is_allocated()?);
    assert_eq!(*events.lock().unwrap(), 0);

    // The implicit transaction is closed again.
    nm.set(0, &[2, 1, 0])?;
    assert_eq!(nm.get(0)?, vec![2, 1, 0]);
    Ok(())
}

#[test]
fn rejected_mapping_phase_keeps_previous_facemap() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let z = ds.add_poly_zone(PolytopeKind::Polygon, "square", 4, 2, 0)?;
    let fm = z.facemap();
    let (faces, elements) = square_edges();
    fm.set_mapping(&faces, &elements, &[])?;

    let mut bent = faces.clone();
    bent[0] = vec![0, 1, 2];
    let err = fm.set_mapping(&bent, &elements, &[]).unwrap_err();
    assert!(matches!(err, DataError::InvalidArgument(_)));
    assert_eq!(fm.nodes(0)?, vec![0, 1]);
    assert_eq!(fm.num_face_nodes()?, 10);
    // No transaction was left open.
    fm.set_mapping(&faces, &elements, &[])?;
    assert_eq!(fm.num_faces()?, 5);
    Ok(())
}

#[test]
fn deleting_a_zone_drops_connections_into_it() -> Result<(), DataError> {
    let session = Session::default();
    let ds = fe_dataset(&session);
    let left = ds.add_poly_zone(PolytopeKind::Polygon, "left", 4, 2, 0)?;
    let right = ds.add_fe_zone(ElementType::Quad, "right", 4, 1)?;
    let options = |name: &str| {
        ZoneOptions::classic_fe(name, ElementType::Triangle, 3, 1)
            .face_neighbor_mode(FaceNeighborMode::GLOBAL_ONE_TO_MANY)
    };
    let a = ds.add_zone(options("a"))?;
    let (faces, elements) = square_edges();
    let boundary = [BoundaryFace {
        face: 1,
        connections: vec![(0, 1)],
    }];
    left.facemap().set_mapping(&faces, &elements, &boundary)?;
    let fnb = a.face_neighbors()?;
    let tx = fnb.assignment()?;
    tx.add_neighbors(0, 0, &[0, 1], Some(&[1, 0][..]), true)?;
    tx.finish()?;

    ds.delete_zones([right.zone()])?;
    let fm = left.facemap();
    assert_eq!(fm.num_boundary_faces()?, 0);
    assert!(fm.boundary_connections(1)?.is_empty());
    assert_eq!(fm.nodes(1)?, vec![1, 2]);
    assert_eq!(fnb.neighbors(0, 0)?, vec![Neighbor::global(1, left.id())]);
    assert!(fnb.is_obscured(0, 0, None)?);
    Ok(())
}
