use zonal_data::data_error::ItemKind;
use zonal_data::prelude::*;

#[test]
fn ordered_zone_counts() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::default();
    let ds = session.create_dataset("cube");
    ds.add_variable("x")?;
    ds.add_variable("y")?;
    let z = ds.add_ordered_zone("block", (3, 3, 3))?;
    assert_eq!(z.num_points()?, 27);
    assert_eq!(z.num_elements()?, 8);
    assert_eq!(z.rank()?, 3);
    assert_eq!(z.num_points_per_element()?, 8);
    assert_eq!(z.num_faces_per_element()?, 6);
    assert_eq!(z.num_variables()?, 2);
    assert_eq!(z.zone_type()?, ZoneType::Ordered);
    Ok(())
}

#[test]
fn new_variable_gets_one_array_per_zone() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("x")?;
    ds.add_ordered_zone("a", (4, 1, 1))?;
    ds.add_fe_zone(ElementType::Quad, "b", 4, 1)?;
    ds.add_poly_zone(PolytopeKind::Polygon, "c", 5, 1, 5)?;

    let s = ds.add_variable("s")?;
    assert_eq!(ds.num_variables()?, 2);
    for zone in ds.zones() {
        let arr = s.values(zone)?;
        assert_eq!(arr.len()?, zone.num_points()?);
        assert_eq!(arr.value_type()?, ValueType::Float);
        assert_eq!(arr.location()?, Location::Nodal);
        assert!(arr.to_vec()?.iter().all(|&v| v == 0.0));
    }
    Ok(())
}

#[test]
fn per_zone_options_expand_over_existing_zones() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("x")?;
    ds.add_ordered_zone("a", (3, 3, 1))?;
    ds.add_ordered_zone("b", (2, 2, 1))?;

    let opts = VariableOptions::default()
        .value_types(PerItem::Each(vec![ValueType::Double, ValueType::Int32]))
        .locations(Location::CellCentered)
        .passive(true);
    let p = ds.add_variable_with("p", opts)?;
    let a = p.values(0)?;
    assert_eq!(a.value_type()?, ValueType::Double);
    assert_eq!(a.len()?, 4);
    assert!(a.is_passive()?);
    assert_eq!(p.values(1)?.value_type()?, ValueType::Int32);

    let bad = VariableOptions::default().value_types(PerItem::Each(vec![ValueType::Double]));
    assert!(matches!(
        ds.add_variable_with("q", bad),
        Err(DataError::LengthMismatch { expected: 2, found: 1 })
    ));
    assert_eq!(ds.num_variables()?, 2);
    Ok(())
}

#[test]
fn zones_need_a_variable() {
    let session = Session::default();
    let ds = session.create_dataset("t");
    let err = ds.add_ordered_zone("a", (2, 2, 2)).unwrap_err();
    assert_eq!(err, DataError::NoVariables);
    assert_eq!(err.kind(), ErrorKind::Logic);
}

#[test]
fn degenerate_shapes_are_rejected() {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("x").unwrap();
    assert!(matches!(
        ds.add_ordered_zone("a", (0, 2, 2)),
        Err(DataError::InvalidShape(_))
    ));
    assert!(matches!(
        ds.add_fe_zone(ElementType::Tetra, "b", 4, 0),
        Err(DataError::InvalidShape(_))
    ));
    assert_eq!(ds.num_zones().unwrap(), 0);
}

#[test]
fn deleting_every_variable_or_zone_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("x")?;
    ds.add_variable("y")?;
    ds.add_ordered_zone("a", (2, 1, 1))?;
    ds.add_ordered_zone("b", (2, 1, 1))?;

    assert_eq!(
        ds.delete_variables(["x", "y"]),
        Err(DataError::LastItem(ItemKind::Variable))
    );
    assert_eq!(ds.num_variables()?, 2);
    assert_eq!(
        ds.delete_zones([0, 1]),
        Err(DataError::LastItem(ItemKind::Zone))
    );
    assert_eq!(ds.num_zones()?, 2);

    ds.delete_variables(["x"])?;
    assert_eq!(ds.variable_names()?, vec!["y".to_owned()]);
    ds.delete_zones([0])?;
    assert_eq!(ds.zone(0)?.name()?, "b");
    Ok(())
}

#[test]
fn handles_survive_deletion_of_other_items() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("x")?;
    let a = ds.add_ordered_zone("a", (2, 1, 1))?.zone();
    let b = ds.add_ordered_zone("b", (2, 1, 1))?.zone();
    assert_eq!(b.index()?, 1);
    ds.delete_zones([a])?;
    assert_eq!(b.index()?, 0);
    assert_eq!(b.name()?, "b");
    assert_eq!(a.name().unwrap_err().kind(), ErrorKind::Index);
    Ok(())
}

#[test]
fn lookup_by_index_glob_and_handle() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("Pressure")?;
    ds.add_variable("Temp")?;
    ds.add_ordered_zone("wing-upper", (2, 1, 1))?;
    ds.add_ordered_zone("wing-lower", (2, 1, 1))?;
    let tail = ds.add_ordered_zone("tail", (2, 1, 1))?;

    assert_eq!(ds.zone(-1)?, tail.zone());
    assert_eq!(ds.zone("WING-*")?.name()?, "wing-upper");
    assert_eq!(ds.zone(tail.id())?.index()?, 2);
    assert_eq!(ds.variable("p*")?.name()?, "Pressure");
    assert_eq!(ds.variable("t??p")?.index()?, 1);

    let re = regex::Regex::new("lower$")?;
    assert_eq!(ds.zone(&re)?.index()?, 1);

    assert!(matches!(ds.zone("fuselage"), Err(DataError::NotFound { .. })));
    assert!(matches!(ds.zone(3), Err(DataError::IndexOutOfRange { .. })));

    let names: Vec<String> = ds
        .zones_matching("wing-*")?
        .map(|z| z.name())
        .collect::<Result<_, _>>()?;
    assert_eq!(names, ["wing-upper", "wing-lower"]);
    Ok(())
}

#[test]
fn handles_from_another_dataset_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::default();
    let one = session.create_dataset("one");
    let two = session.create_dataset("two");
    one.add_variable("x")?;
    two.add_variable("x")?;
    let z = one.add_ordered_zone("a", (2, 1, 1))?;
    two.add_ordered_zone("b", (2, 1, 1))?;
    assert!(matches!(
        two.zone(&z.zone()),
        Err(DataError::DatasetMismatch { .. })
    ));
    Ok(())
}

#[test]
fn disabled_zones_are_skipped_by_iteration() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("x")?;
    ds.add_ordered_zone("a", (2, 1, 1))?;
    let b = ds.add_ordered_zone("b", (2, 1, 1))?;
    ds.add_ordered_zone("c", (2, 1, 1))?;
    b.set_enabled(false)?;
    assert_eq!(ds.zones().count(), 2);
    assert_eq!(ds.num_zones()?, 3);
    b.set_enabled(true)?;
    assert_eq!(ds.zones().count(), 3);
    Ok(())
}

#[test]
fn zone_metadata_and_solution_times() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("x")?;
    let parent = ds.add_ordered_zone("p", (2, 2, 1))?;
    let child = ds.add_zone(
        ZoneOptions::ordered("c", (2, 2, 1))
            .parent(parent.id())
            .solution_time(2.5)
            .strand_id(3),
    )?;
    ds.add_zone(ZoneOptions::ordered("d", (2, 2, 1)).solution_time(2.5))?;
    assert_eq!(child.parent()?, Some(parent.zone()));
    assert_eq!(child.strand()?, 3);
    assert_eq!(ds.solution_times()?, vec![0.0, 2.5]);
    assert_eq!(ds.num_solution_times()?, 2);

    child.set_solution_time(1.0)?;
    child.set_name("renamed")?;
    assert_eq!(ds.solution_times()?, vec![0.0, 1.0, 2.5]);
    assert_eq!(ds.zone("renamed")?, child);

    ds.delete_zones([parent])?;
    assert_eq!(child.parent()?, None);
    Ok(())
}

#[test]
fn replacing_a_zone_keeps_its_index() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("x")?;
    ds.add_ordered_zone("a", (2, 1, 1))?;
    ds.add_ordered_zone("b", (2, 1, 1))?;
    let c = ds.add_zone(ZoneOptions::classic_fe("c", ElementType::LineSeg, 2, 1).index(0))?;
    assert_eq!(ds.num_zones()?, 2);
    assert_eq!(c.index()?, 0);
    assert_eq!(c.zone_type()?, ZoneType::FELineSeg);
    Ok(())
}

#[test]
fn long_names_are_rejected() {
    let session = Session::new(SessionConfig {
        max_name_len: 4,
        ..SessionConfig::default()
    });
    let ds = session.create_dataset("t");
    let err = ds.add_variable("velocity").unwrap_err();
    assert!(matches!(err, DataError::NameTooLong { found: 8, max: 4, .. }));
    assert_eq!(err.kind(), ErrorKind::Value);
    let v = ds.add_variable("u").unwrap();
    assert!(v.set_name("pressure").is_err());
    assert_eq!(v.name().unwrap(), "u");
}

#[test]
fn removed_datasets_stop_resolving() {
    let session = Session::default();
    let ds = session.create_dataset("t");
    let id = ds.id();
    assert_eq!(session.datasets().len(), 1);
    session.remove_dataset(id).unwrap();
    assert!(session.datasets().is_empty());
    assert!(matches!(session.dataset(id), Err(DataError::DatasetNotFound(_))));
    assert_eq!(ds.title().unwrap_err().kind(), ErrorKind::Index);
}
