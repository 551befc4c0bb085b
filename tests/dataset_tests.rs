//! Integration tests for dataset tables and sanitizing passes.

use basis_optimizer::Error;
use basis_optimizer::dataset::{self, Dataset, Sample};
use basis_optimizer::parameter::{Bounds, OrbitalType, ParameterSpace};

fn temp_path(name: &str) -> std::path::PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    std::env::temp_dir().join(format!(
        "basis_opt_dataset_test_{}_{}_{name}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

fn sp_space() -> ParameterSpace {
    ParameterSpace::new(
        vec![
            Bounds::new(0.01, 20.0).unwrap(),
            Bounds::new(0.01, 50.0).unwrap(),
            Bounds::new(0.01, 5.0).unwrap(),
        ],
        vec![OrbitalType::S, OrbitalType::S, OrbitalType::P],
    )
    .unwrap()
}

#[test]
fn table_survives_save_and_load() {
    let path = temp_path("training.dat");
    let data = Dataset::from_samples(vec![
        Sample::new(vec![1.25, 30.5, 0.75], 12.345_678_9),
        Sample::new(vec![19.99999, 0.01, 4.5], 0.001),
    ]);
    data.save(&path).unwrap();

    let loaded = Dataset::load(&path, 3).unwrap();
    assert_eq!(loaded.len(), 2);
    for (a, b) in loaded.iter().zip(&data) {
        for (x, y) in a.parameters.iter().zip(&b.parameters) {
            assert!((x - y).abs() < 1e-5);
        }
        assert!((a.value - b.value).abs() < 1e-8);
    }
    std::fs::remove_file(&path).ok();
}

#[test]
fn table_rows_are_fixed_width_and_backed_up() {
    let path = temp_path("fixed.dat");
    Dataset::from_samples(vec![Sample::new(vec![1.0, 2.0], 3.0)])
        .save(&path)
        .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, "    1.00000    2.00000      3.00000000\n");

    // Rewriting keeps the previous table next to the new one.
    Dataset::from_samples(vec![Sample::new(vec![4.0, 5.0], 6.0)])
        .save(&path)
        .unwrap();
    let mut prev = path.clone().into_os_string();
    prev.push("_prev");
    assert_eq!(std::fs::read_to_string(&prev).unwrap(), text);

    std::fs::remove_file(&path).ok();
    std::fs::remove_file(&prev).ok();
}

#[test]
fn comments_and_blank_lines_are_skipped() {
    let path = temp_path("comments.dat");
    std::fs::write(&path, "# x0 x1 value\n\n 1.0 2.0 3.0\n   \n 4.0 5.0 6.0\n").unwrap();

    let loaded = Dataset::load(&path, 2).unwrap();
    assert_eq!(loaded.targets(), vec![3.0, 6.0]);
    std::fs::remove_file(&path).ok();
}

#[test]
fn missing_table_is_reported() {
    let err = Dataset::load(temp_path("absent.dat"), 2).unwrap_err();
    assert!(matches!(err, Error::MissingFile { .. }));
}

#[test]
fn wrong_column_count_names_the_line() {
    let path = temp_path("short.dat");
    std::fs::write(&path, " 1.0 2.0 3.0\n 4.0 5.0\n").unwrap();

    let err = Dataset::load(&path, 2).unwrap_err();
    match err {
        Error::Table { line, .. } => assert_eq!(line, 2),
        other => panic!("expected a table error, got {other:?}"),
    }
    std::fs::remove_file(&path).ok();
}

#[test]
fn non_numeric_field_is_rejected() {
    let path = temp_path("garbage.dat");
    std::fs::write(&path, " 1.0 abc 3.0\n").unwrap();
    assert!(matches!(
        Dataset::load(&path, 2),
        Err(Error::Table { line: 1, .. })
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
fn bootstrap_is_reproducible_and_in_bounds() {
    let space = sp_space();
    let a = dataset::bootstrap(25, &space, 100_001);
    let b = dataset::bootstrap(25, &space, 100_001);
    let c = dataset::bootstrap(25, &space, 200_001);

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 25);
    assert!(a.iter().all(|x| space.contains(x)));
}

#[test]
fn deduplicate_keeps_first_of_each_cluster() {
    let data = Dataset::from_samples(vec![
        Sample::new(vec![1.0, 1.0], 5.0),
        Sample::new(vec![1.0, 1.0005], 1.0),
        Sample::new(vec![3.0, 3.0], 2.0),
        Sample::new(vec![3.0002, 3.0], 9.0),
    ]);

    let clean = data.deduplicate(1e-3);
    assert_eq!(clean.targets(), vec![5.0, 2.0]);
    assert_eq!(clean.deduplicate(1e-3), clean);
    assert_eq!(data.len(), 4, "original is untouched");
}

#[test]
fn linear_independence_only_raises_values() {
    let space = sp_space();
    let data = Dataset::from_samples(vec![
        Sample::new(vec![1.0, 1.2, 0.5], 3.0),
        Sample::new(vec![1.0, 10.0, 0.5], 4.0),
        Sample::new(vec![7.0, 7.1, 1.0], 50_000.0),
    ]);

    let fixed = data.enforce_linear_independence(&space, 0.5, 30_000.0);
    assert_eq!(fixed.targets(), vec![30_000.0, 4.0, 50_000.0]);
}

#[test]
fn groups_sorted_per_orbital_type() {
    let space = sp_space();
    let data = Dataset::from_samples(vec![Sample::new(vec![9.0, 2.0, 4.0], 1.0)]);
    let sorted = data.sorted_within_groups(&space);
    assert_eq!(sorted.samples()[0].parameters, vec![2.0, 9.0, 4.0]);
}

#[test]
fn minimum_prefers_first_on_ties() {
    let data = Dataset::from_samples(vec![
        Sample::new(vec![1.0], 2.0),
        Sample::new(vec![2.0], 1.0),
        Sample::new(vec![3.0], 1.0),
    ]);
    assert_eq!(data.minimum_index(), Some(1));
    assert_eq!(data.maximum().unwrap().parameters, vec![1.0]);
    assert!(Dataset::new().minimum().is_none());
}
