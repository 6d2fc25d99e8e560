use zonal_data::prelude::*;

fn line_dataset(session: &Session) -> Dataset<'_> {
    let ds = session.create_dataset("line");
    ds.add_variable("x").unwrap();
    ds.add_ordered_zone("a", (6, 1, 1)).unwrap();
    ds
}

#[test]
fn element_access_with_negative_indices() -> Result<(), DataError> {
    let session = Session::default();
    let ds = line_dataset(&session);
    let arr = ds.zone(0)?.values("x")?;
    arr.set_all(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0])?;
    assert_eq!(arr.get(-1)?, 5.0);
    arr.set(-2, 40.0)?;
    assert_eq!(arr.get(4)?, 40.0);
    assert!(matches!(arr.get(6), Err(DataError::IndexOutOfRange { .. })));
    assert!(matches!(arr.set(-7, 1.0), Err(DataError::IndexOutOfRange { .. })));
    Ok(())
}

#[test]
fn slices_read_and_write() -> Result<(), DataError> {
    let session = Session::default();
    let ds = line_dataset(&session);
    let arr = ds.zone(0)?.values(0)?;
    arr.set_slice(1..4, &[1.0, 2.0, 3.0])?;
    assert_eq!(arr.get_slice(..=2)?, vec![0.0, 1.0, 2.0]);
    assert_eq!(arr.get_slice(ArraySlice::new(Some(-3), None, 1))?, vec![3.0, 0.0, 0.0]);

    arr.set_slice(ArraySlice::FULL.step_by(2), &[-1.0, -2.0, -3.0])?;
    assert_eq!(arr.to_vec()?, vec![-1.0, 1.0, -2.0, 3.0, -3.0, 0.0]);

    assert_eq!(
        arr.set_slice(0..2, &[1.0]),
        Err(DataError::LengthMismatch { expected: 2, found: 1 })
    );
    assert!(arr.get_slice(4..2)?.is_empty());
    Ok(())
}

#[test]
fn unrepresentable_values_write_nothing() -> Result<(), DataError> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable_with("n", VariableOptions::default().value_types(ValueType::Int16))?;
    ds.add_variable("x")?;
    let z = ds.add_zone(ZoneOptions::ordered("a", (4, 1, 1)).value_types(PerItem::Each(vec![
        ValueType::Int16,
        ValueType::Double,
    ])))?;
    let n = z.values("n")?;
    assert_eq!(n.value_type()?, ValueType::Int16);
    let err = n.set_all(&[1.0, 2.0, 1e9, 4.0]).unwrap_err();
    assert!(matches!(err, DataError::ValueOutOfRange { .. }));
    assert_eq!(err.kind(), ErrorKind::Value);
    let err = n
        .set_slice(ArraySlice::FULL.step_by(2), &[7.0, 1e9])
        .unwrap_err();
    assert!(matches!(err, DataError::ValueOutOfRange { .. }));
    assert_eq!(n.to_vec()?, vec![0.0; 4]);
    Ok(())
}

#[test]
fn passive_arrays_read_zero_until_written() -> Result<(), DataError> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("x")?;
    let z = ds.add_zone(ZoneOptions::ordered("a", (3, 3, 1)).passive(true))?;
    let arr = z.values(0)?;
    assert!(arr.is_passive()?);
    assert_eq!(arr.to_vec()?, vec![0.0; 9]);
    assert_eq!(arr.minmax()?, (0.0, 0.0));
    arr.set(4, 2.0)?;
    assert!(!arr.is_passive()?);
    assert_eq!(arr.max()?, 2.0);
    Ok(())
}

#[test]
fn cell_centered_arrays_follow_element_count() -> Result<(), DataError> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable_with(
        "c",
        VariableOptions::default().locations(Location::CellCentered),
    )?;
    let z = ds.add_zone(ZoneOptions::ordered("a", (4, 3, 1)).locations(Location::CellCentered))?;
    let arr = z.values("c")?;
    assert_eq!(arr.location()?, Location::CellCentered);
    assert_eq!(arr.len()?, 6);
    Ok(())
}

#[test]
fn assign_copies_between_zones_and_datasets() -> Result<(), DataError> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable("x")?;
    let a = ds.add_ordered_zone("a", (3, 1, 1))?;
    let b = ds.add_ordered_zone("b", (3, 1, 1))?;
    let c = ds.add_ordered_zone("c", (4, 1, 1))?;
    a.values(0)?.set_all(&[1.0, 2.0, 3.0])?;
    b.values(0)?.assign(&a.values(0)?)?;
    assert_eq!(b.values(0)?.to_vec()?, vec![1.0, 2.0, 3.0]);
    assert!(matches!(
        c.values(0)?.assign(&a.values(0)?),
        Err(DataError::LengthMismatch { .. })
    ));

    let other = Session::default();
    let ods = other.create_dataset("o");
    ods.add_variable("x")?;
    let oz = ods.add_ordered_zone("z", (3, 1, 1))?;
    oz.values(0)?.assign(&a.values(0)?)?;
    assert_eq!(oz.values(0)?.to_vec()?, vec![1.0, 2.0, 3.0]);
    Ok(())
}

#[test]
fn value_locked_variables_refuse_writes() -> Result<(), DataError> {
    let session = Session::default();
    let ds = line_dataset(&session);
    let x = ds.variable("x")?;
    x.set_lock_mode(VariableLockMode::ValueLocked)?;
    let err = x.values(0)?.set(0, 1.0).unwrap_err();
    assert!(matches!(err, DataError::VariableLocked { .. }));
    x.set_lock_mode(VariableLockMode::None)?;
    x.values(0)?.set(0, 1.0)?;
    Ok(())
}

#[test]
fn direct_view_writes_land_in_storage() -> Result<(), DataError> {
    let session = Session::default();
    let ds = session.create_dataset("t");
    ds.add_variable_with("d", VariableOptions::default().value_types(ValueType::Double))?;
    let z = ds.add_zone(ZoneOptions::ordered("a", (4, 1, 1)).value_types(ValueType::Double))?;
    let arr = z.values(0)?;
    {
        let mut view = arr.as_raw_view(1, Some(2), false)?;
        assert!(view.is_direct());
        assert_eq!(view.len(), 2);
        let values = view.as_mut_slice::<f64>().expect("double storage");
        values.copy_from_slice(&[5.0, 6.0]);
        assert!(view.as_slice::<f32>().is_none());
    }
    arr.mark_altered();
    assert_eq!(arr.to_vec()?, vec![0.0, 5.0, 6.0, 0.0]);
    assert!(arr.as_raw_view(3, Some(2), true).is_err());
    Ok(())
}

#[test]
fn connected_mode_refuses_direct_views_only() -> Result<(), DataError> {
    let session = Session::new(SessionConfig::default().with_mode(ExecutionMode::Connected));
    let ds = line_dataset(&session);
    let arr = ds.zone(0)?.values(0)?;
    arr.set(0, 1.5)?;
    let err = arr.as_raw_view(0, None, false).unwrap_err();
    assert_eq!(err, DataError::RequiresBatchMode);
    let copy = arr.as_raw_view(0, None, true)?;
    assert!(!copy.is_direct());
    assert_eq!(copy.get(0), Some(1.5));
    assert!(matches!(
        ds.add_fe_zone(ElementType::LineSeg, "l", 2, 1)?.nodemap().raw_view(),
        Err(DataError::RequiresBatchMode)
    ));
    Ok(())
}
