use zonal_data::prelude::*;

fn grid(session: &Session) -> Result<(Dataset<'_>, OrderedZone<'_>), DataError> {
    let ds = session.create_dataset("grid");
    ds.add_variable("u")?;
    ds.add_variable("v")?;
    let z = ds.add_ordered_zone("g", (3, 2, 1))?;
    z.values("u")?.set_all(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0])?;
    z.values("v")?.set_all(&[1.0; 6])?;
    Ok((ds, z))
}

#[test]
fn plain_copy_is_independent() -> Result<(), DataError> {
    let session = Session::default();
    let (ds, z) = grid(&session)?;
    let copy = z.copy()?;
    assert_eq!(ds.num_zones()?, 2);
    assert_eq!(copy.name()?, "g");
    assert_eq!(copy.values("u")?.to_vec()?, z.values("u")?.to_vec()?);
    copy.values("u")?.set(0, 10.0)?;
    assert_eq!(z.values("u")?.get(0)?, 0.0);
    Ok(())
}

#[test]
fn copy_can_share_selected_variables() -> Result<(), DataError> {
    let session = Session::default();
    let (ds, z) = grid(&session)?;
    let u = ds.variable("u")?.id();
    let copies = ds.copy_zones([&z], &CopyOptions::default().share([u]))?;
    let copy = copies[0];
    copy.values("u")?.set(1, -1.0)?;
    assert_eq!(z.values("u")?.get(1)?, -1.0);
    copy.values("v")?.set(1, -1.0)?;
    assert_eq!(z.values("v")?.get(1)?, 1.0);

    let all = z.copy_with(&CopyOptions::default().share_all())?;
    assert_eq!(all.values("v")?.shared_zones()?.len(), 2);
    Ok(())
}

#[test]
fn copies_of_fe_zones_branch_the_nodemap() -> Result<(), DataError> {
    let session = Session::default();
    let ds = session.create_dataset("fe");
    ds.add_variable("x")?;
    let z = ds.add_fe_zone(ElementType::Triangle, "tri", 3, 1)?;
    z.nodemap().set(0, &[0, 1, 2])?;
    let copy = z.copy()?.as_classic_fe()?;
    assert_eq!(copy.nodemap().get(0)?, vec![0, 1, 2]);
    copy.nodemap().set(0, &[2, 1, 0])?;
    assert_eq!(z.nodemap().get(0)?, vec![0, 1, 2]);
    Ok(())
}

#[test]
fn mirror_negates_listed_variables_and_shares_the_rest() -> Result<(), DataError> {
    let session = Session::default();
    let (_, z) = grid(&session)?;
    let m = z.mirror(["u"])?;
    assert_eq!(m.values("u")?.to_vec()?, vec![-0.0, -1.0, -2.0, -3.0, -4.0, -5.0]);
    assert_eq!(m.values("v")?.shared_zones()?, vec![z.zone(), m]);
    assert_eq!(m.values("u")?.shared_zones()?, vec![m]);
    Ok(())
}

#[test]
fn mirror_needs_a_recent_engine() -> Result<(), DataError> {
    let session =
        Session::new(SessionConfig::default().with_engine_version(EngineVersion::new(1, 2, 0)));
    let (ds, z) = grid(&session)?;
    assert!(matches!(z.mirror(["u"]), Err(DataError::NotSupported { .. })));
    assert!(matches!(
        z.copy_with(&CopyOptions::default().ranges(IndexRange::ALL, IndexRange::ALL, IndexRange::ALL)),
        Err(DataError::NotSupported { .. })
    ));
    assert_eq!(ds.num_zones()?, 1);
    Ok(())
}

#[test]
fn ranged_copy_keeps_selected_nodes() -> Result<(), DataError> {
    let session = Session::default();
    let (_, z) = grid(&session)?;
    let options = CopyOptions::default().ranges(IndexRange::new(0, -1, 2), IndexRange::ALL, IndexRange::ALL);
    let sub = z.copy_with(&options)?.as_ordered()?;
    assert_eq!(sub.dimensions()?, [2, 2, 1]);
    assert_eq!(sub.values("u")?.to_vec()?, vec![0.0, 2.0, 3.0, 5.0]);
    assert_eq!(sub.num_elements()?, 1);
    Ok(())
}

#[test]
fn ranged_copy_of_fe_zone_is_refused() -> Result<(), DataError> {
    let session = Session::default();
    let ds = session.create_dataset("fe");
    ds.add_variable("x")?;
    let fe = ds.add_fe_zone(ElementType::Quad, "q", 4, 1)?;
    let options = CopyOptions::default().ranges(IndexRange::ALL, IndexRange::ALL, IndexRange::ALL);
    let err = fe.copy_with(&options).unwrap_err();
    assert!(matches!(err, DataError::WrongZoneType { .. }));
    assert_eq!(ds.num_zones()?, 1);
    Ok(())
}

#[test]
fn bad_range_creates_nothing() -> Result<(), DataError> {
    let session = Session::default();
    let (ds, z) = grid(&session)?;
    let b = ds.add_ordered_zone("b", (2, 2, 1))?;
    let options = CopyOptions::default().ranges(IndexRange::new(0, 2, 1), IndexRange::ALL, IndexRange::ALL);
    assert!(matches!(
        ds.copy_zones([z.zone(), b.zone()], &options),
        Err(DataError::IndexOutOfRange { .. })
    ));
    assert_eq!(ds.num_zones()?, 2);
    Ok(())
}

#[test]
fn copy_failing_on_a_later_zone_creates_nothing() -> Result<(), DataError> {
    let session = Session::default();
    let (ds, z) = grid(&session)?;
    let b = ds.add_ordered_zone("b", (2, 2, 1))?;
    let busy = b.values("u")?;
    {
        let _view = busy.as_raw_view(0, None, false)?;
        let err = ds.copy_zones([z.zone(), b.zone()], &CopyOptions::default()).unwrap_err();
        assert_eq!(err, DataError::StorageInUse);
        assert_eq!(ds.num_zones()?, 2);
    }
    let copies = ds.copy_zones([z.zone(), b.zone()], &CopyOptions::default())?;
    assert_eq!(copies.len(), 2);
    assert_eq!(ds.num_zones()?, 4);
    assert_eq!(copies[0].values("u")?.to_vec()?, z.values("u")?.to_vec()?);
    Ok(())
}
