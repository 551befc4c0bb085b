use std::sync::Arc;

use basis_optimizer::objective::PenaltyWeights;
use basis_optimizer::storage::RunLock;
use basis_optimizer::{Config, DatasetRole, Error, JobType, Study};

use crate::support::{Quadratic, cleanup, never_converging, small_config};

fn build(config: Config, eval: Quadratic) -> (Arc<Quadratic>, Study<Quadratic>) {
    let eval = Arc::new(eval);
    let study = Study::builder(config)
        .shared_evaluator(Arc::clone(&eval))
        .build()
        .unwrap();
    (eval, study)
}

#[test]
fn failed_bootstrap_leaves_no_table() {
    let (eval, mut study) = build(small_config(), Quadratic::failing_after(3));

    let err = study.run_job(JobType::GenerateTraining).unwrap_err();
    assert!(matches!(err, Error::ExternalJob { .. }));
    assert_eq!(eval.jobs(), 4);
    assert!(!study.config().dataset_path(DatasetRole::Training).exists());
    cleanup(study.config());
}

#[test]
fn failed_candidate_aborts_without_touching_tables() {
    // Training and testing need 8 jobs; the first candidate fails.
    let (_, mut study) = build(never_converging(3), Quadratic::failing_after(8));

    let err = study.run().unwrap_err();
    assert!(matches!(err, Error::ExternalJob { .. }));

    let training = basis_optimizer::dataset::Dataset::load(
        study.config().dataset_path(DatasetRole::Training),
        2,
    )
    .unwrap();
    assert_eq!(training.len(), 6);
    let state = study.state().unwrap();
    assert_eq!(state.iteration, 0);
    assert!(!state.converged);
    cleanup(study.config());
}

#[test]
fn missing_energies_abort_the_run() {
    let mut config = small_config();
    config.weights = PenaltyWeights::default();
    let (_, mut study) = build(config, Quadratic::without_energies());

    assert!(matches!(
        study.run(),
        Err(Error::MissingEnergyData { .. })
    ));
    cleanup(study.config());
}

#[test]
fn busy_work_directory_is_refused() {
    let (eval, mut study) = build(small_config(), Quadratic::default());
    std::fs::create_dir_all(&study.config().work_dir).unwrap();
    let lock = RunLock::acquire(&study.config().work_dir).unwrap();

    assert!(matches!(study.run(), Err(Error::Storage(_))));
    assert_eq!(eval.jobs(), 0);

    drop(lock);
    assert!(study.run_job(JobType::GenerateTesting).is_ok());
    cleanup(study.config());
}

#[test]
fn corrupt_state_file_is_reported() {
    let config = never_converging(1);
    let (_, mut study) = build(config, Quadratic::default());
    study.run_job(JobType::GenerateTraining).unwrap();
    std::fs::write(study.config().state_path(), "{ not json").unwrap();

    assert!(matches!(study.run(), Err(Error::Storage(_))));
    cleanup(study.config());
}

#[test]
fn builder_needs_an_evaluator() {
    let result = Study::<Quadratic>::builder(small_config()).build();
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn inconsistent_config_is_rejected() {
    let mut config = small_config();
    config.testing.seed = config.training.seed;
    assert!(matches!(
        Study::new(config, Quadratic::default()),
        Err(Error::InvalidConfig(_))
    ));

    let mut config = small_config();
    config.systems.clear();
    assert!(matches!(
        Study::new(config, Quadratic::default()),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn shell_study_needs_a_shell_section() {
    assert!(matches!(
        Study::from_config(small_config()),
        Err(Error::InvalidConfig(_))
    ));
}
