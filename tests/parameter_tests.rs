use basis_optimizer::Error;
use basis_optimizer::dataset::{Dataset, Sample};
use basis_optimizer::parameter::{Bounds, OrbitalType, ParameterSpace, even_tempered_exponents};

fn spd() -> ParameterSpace {
    ParameterSpace::new(
        vec![
            Bounds::new(0.01, 20.0).unwrap(),
            Bounds::new(0.01, 50.0).unwrap(),
            Bounds::new(0.01, 5.0).unwrap(),
            Bounds::new(0.01, 5.0).unwrap(),
            Bounds::new(0.1, 2.0).unwrap(),
        ],
        vec![
            OrbitalType::S,
            OrbitalType::S,
            OrbitalType::P,
            OrbitalType::P,
            OrbitalType::D,
        ],
    )
    .unwrap()
}

#[test]
fn bounds_reject_inverted_and_non_finite_ends() {
    assert!(matches!(
        Bounds::new(2.0, 1.0),
        Err(Error::InvalidBounds { .. })
    ));
    assert!(Bounds::new(f64::NAN, 1.0).is_err());
    assert!(Bounds::new(0.0, f64::INFINITY).is_err());
    // A degenerate interval pins the parameter.
    let fixed = Bounds::new(3.0, 3.0).unwrap();
    assert!((fixed.to_unit(3.0) - 0.5).abs() < f64::EPSILON);
}

#[test]
fn unit_cube_mapping_round_trips() {
    let space = spd();
    let x = vec![10.0, 0.01, 2.5, 5.0, 1.0];
    let u = space.to_unit(&x);
    assert!(u.iter().all(|v| (0.0..=1.0).contains(v)));
    assert!((u[1]).abs() < 1e-12);
    assert!((u[3] - 1.0).abs() < 1e-12);
    for (a, b) in space.from_unit(&u).iter().zip(&x) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn clamp_and_contains_agree() {
    let space = spd();
    let outside = vec![-1.0, 60.0, 2.0, 2.5, 3.0];
    assert!(!space.contains(&outside));
    let clamped = space.clamp(&outside);
    assert_eq!(clamped, vec![0.01, 50.0, 2.0, 2.5, 2.0]);
    assert!(space.contains(&clamped));
    assert!(!space.contains(&clamped[..4]));
}

#[test]
fn groups_follow_orbital_types() {
    assert_eq!(spd().groups(), vec![0..2, 2..4, 4..5]);
}

#[test]
fn dependence_is_checked_within_groups_only() {
    let space = spd();
    // 2.0 appears in the s and the p group, which is fine.
    assert!(!space.is_linearly_dependent(&[2.0, 9.0, 2.0, 4.0, 1.0], 0.5));
    // Two p exponents 0.2 apart are not.
    assert!(space.is_linearly_dependent(&[2.0, 9.0, 2.0, 2.2, 1.0], 0.5));
    // Order inside a group does not matter.
    assert!(space.is_linearly_dependent(&[9.0, 8.8, 1.0, 4.0, 1.0], 0.5));
}

#[test]
fn sorting_stays_inside_groups() {
    let sorted = spd().sort_within_groups(&[9.0, 2.0, 4.0, 1.0, 0.5]);
    assert_eq!(sorted, vec![2.0, 9.0, 1.0, 4.0, 0.5]);
}

#[test]
fn wrong_lengths_are_reported() {
    let space = spd();
    assert!(matches!(
        space.check_len(&[1.0, 2.0]),
        Err(Error::DimensionMismatch {
            expected: 5,
            got: 2
        })
    ));
    assert!(matches!(
        ParameterSpace::new(vec![Bounds::new(0.0, 1.0).unwrap()], vec![]),
        Err(Error::DimensionMismatch { .. })
    ));
    assert!(matches!(
        ParameterSpace::new(vec![], vec![]),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn short_vectors_do_not_panic_group_checks() {
    let space = spd();
    // Only the s group is covered; the p pair would be dependent if present.
    assert!(!space.is_linearly_dependent(&[2.0, 9.0, 2.0], 0.5));
    assert!(space.is_linearly_dependent(&[2.0, 2.1], 0.5));
    assert_eq!(space.sort_within_groups(&[9.0, 2.0, 4.0]), vec![2.0, 9.0, 4.0]);

    let data = Dataset::from_samples(vec![Sample::new(vec![2.0, 9.0, 2.0], 1.0)]);
    let guarded = data.enforce_linear_independence(&space, 0.5, 100.0);
    assert!((guarded.samples()[0].value - 1.0).abs() < f64::EPSILON);
}

#[test]
fn even_tempered_pairs_expand_per_shell() {
    let exps = even_tempered_exponents(&[0.1, 3.0, 0.5, 2.0], &[3, 2]).unwrap();
    let expected = [0.1, 0.3, 0.9, 0.5, 1.0];
    assert_eq!(exps.len(), expected.len());
    for (a, b) in exps.iter().zip(expected) {
        assert!((a - b).abs() < 1e-12);
    }
    assert!(even_tempered_exponents(&[0.1, 3.0, 0.5], &[3, 2]).is_err());
}

#[test]
fn space_serializes_as_plain_lists() {
    let json = serde_json::to_value(spd()).unwrap();
    assert_eq!(json["bounds"][0], serde_json::json!([0.01, 20.0]));
    assert_eq!(json["orbital_types"][4], serde_json::json!("D"));

    let back: ParameterSpace = serde_json::from_value(json).unwrap();
    assert_eq!(back, spd());
}
