use proptest::prelude::*;

use zonal_data::prelude::*;

/// Positions selected by `start..stop` with `step` over `len` values, with
/// negative bounds counted from the end and everything clamped.
fn model_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let n = len as i64;
    let clamp = |b: i64| if b < 0 { (b + n).max(0) } else { b.min(n) };
    let start = start.map_or(0, clamp);
    let stop = stop.map_or(n, clamp);
    let mut out = Vec::new();
    let mut i = start;
    while i < stop {
        out.push(i as usize);
        i += step;
    }
    out
}

proptest! {
    #[test]
    fn slices_select_model_positions(
        len in 0usize..40,
        start in proptest::option::of(-50i64..50),
        stop in proptest::option::of(-50i64..50),
        step in 1i64..6,
    ) {
        let resolved = ArraySlice::new(start, stop, step).resolve(len).unwrap();
        let got: Vec<usize> = resolved.indices().collect();
        prop_assert_eq!(got, model_indices(len, start, stop, step));
    }

    #[test]
    fn slice_writes_touch_only_selected_values(
        len in 1usize..30,
        start in proptest::option::of(-35i64..35),
        stop in proptest::option::of(-35i64..35),
        step in 1i64..5,
    ) {
        let session = Session::default();
        let ds = session.create_dataset("p");
        ds.add_variable_with("d", VariableOptions::default().value_types(ValueType::Double)).unwrap();
        let z = ds.add_zone(ZoneOptions::ordered("z", (len, 1, 1)).value_types(ValueType::Double)).unwrap();
        let arr = z.values(0).unwrap();

        let picked = model_indices(len, start, stop, step);
        let values: Vec<f64> = (1..=picked.len()).map(|v| v as f64).collect();
        let slice = ArraySlice::new(start, stop, step);
        arr.set_slice(slice, &values).unwrap();

        prop_assert_eq!(arr.get_slice(slice).unwrap(), values.clone());
        let all = arr.to_vec().unwrap();
        for (i, v) in all.iter().enumerate() {
            match picked.iter().position(|&p| p == i) {
                Some(k) => prop_assert_eq!(*v, values[k]),
                None => prop_assert_eq!(*v, 0.0),
            }
        }
    }

    #[test]
    fn reverse_lookup_matches_brute_force(
        rows in proptest::collection::vec(proptest::array::uniform3(0usize..8), 1..12),
    ) {
        let session = Session::default();
        let ds = session.create_dataset("p");
        ds.add_variable("x").unwrap();
        let z = ds.add_fe_zone(ElementType::Triangle, "t", 8, rows.len()).unwrap();
        let nm = z.nodemap();
        nm.set_all(&rows.iter().map(|r| r.to_vec()).collect::<Vec<_>>()).unwrap();
        for node in 0..8 {
            let expected: Vec<usize> = rows
                .iter()
                .enumerate()
                .filter(|(_, r)| r.contains(&node))
                .map(|(e, _)| e)
                .collect();
            prop_assert_eq!(nm.elements_using_node(node).unwrap(), expected);
        }
    }

    #[test]
    fn inclusive_ranges_stay_in_bounds(
        dim in 1usize..20,
        min in 0i64..20,
        step in 1usize..4,
    ) {
        let range = IndexRange { min, max: None, step };
        match range.resolve(dim) {
            Ok(picked) => {
                prop_assert!(picked.iter().all(|&i| i < dim));
                prop_assert_eq!(picked.first().copied(), Some(min as usize));
                prop_assert!(picked.windows(2).all(|w| w[1] - w[0] == step));
            }
            Err(err) => {
                prop_assert!(min as usize >= dim);
                prop_assert_eq!(err.kind(), ErrorKind::Index);
            }
        }
    }
}
