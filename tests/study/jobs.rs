use std::sync::Arc;

use basis_optimizer::dataset::Dataset;
use basis_optimizer::{Config, DatasetRole, JobType, Outcome, Phase, Study};

use crate::support::{Quadratic, cleanup, never_converging, small_config};

fn study(config: Config) -> (Arc<Quadratic>, Study<Quadratic>) {
    let eval = Arc::new(Quadratic::default());
    let study = Study::builder(config)
        .shared_evaluator(Arc::clone(&eval))
        .build()
        .unwrap();
    (eval, study)
}

#[test]
fn generated_tables_are_reused() {
    let (eval, mut study) = study(small_config());

    let first = study.run_job(JobType::GenerateTraining).unwrap();
    assert_eq!(
        first,
        Outcome::DatasetReady {
            role: DatasetRole::Training,
            samples: 6
        }
    );
    assert_eq!(eval.jobs(), 6);

    let again = study.run_job(JobType::GenerateTraining).unwrap();
    assert_eq!(again, first);
    assert_eq!(eval.jobs(), 6, "an existing table is not re-evaluated");

    let testing = study.run_job(JobType::GenerateTesting).unwrap();
    assert_eq!(
        testing,
        Outcome::DatasetReady {
            role: DatasetRole::Testing,
            samples: 2
        }
    );
    assert_eq!(eval.jobs(), 8);
    assert!(study.state().is_none());
    cleanup(study.config());
}

#[test]
fn bootstrap_values_come_from_the_objective() {
    let (_, mut study) = study(small_config());
    study.run_job(JobType::GenerateTraining).unwrap();

    let training =
        Dataset::load(study.config().dataset_path(DatasetRole::Training), 2).unwrap();
    for sample in &training {
        assert!(study.config().parameters.contains(&sample.parameters));
        let expected: f64 = sample.parameters.iter().map(|x| x * x).sum();
        // Parameters are stored to five decimals.
        assert!((sample.value - expected).abs() < 1e-4);
    }
    cleanup(study.config());
}

#[test]
fn unevaluated_training_set_only_writes_inputs() {
    let mut config = small_config();
    config.evaluate_training_set = false;
    config.job_type = JobType::All;
    let (eval, mut study) = study(config);

    let outcome = study.run().unwrap();
    assert_eq!(outcome, Outcome::InputsWritten { count: 6 });
    assert_eq!(eval.jobs(), 0);
    assert_eq!(eval.input_tags(), vec!["0", "1", "2", "3", "4", "5"]);
    assert!(!study.config().dataset_path(DatasetRole::Training).exists());
    assert!(!study.config().state_path().exists());
    cleanup(study.config());
}

#[test]
fn unevaluated_candidate_stops_after_the_search() {
    let mut config = never_converging(3);
    config.evaluate_candidate = false;
    let (eval, mut study) = study(config);

    let outcome = study.run().unwrap();
    assert_eq!(outcome, Outcome::InputsWritten { count: 1 });
    assert_eq!(eval.jobs(), 6 + 2);
    assert_eq!(eval.input_tags(), vec!["candidate"]);

    let state = study.state().unwrap();
    assert_eq!(state.phase, Phase::Terminated);
    assert_eq!(state.iteration, 0);
    assert!(state.predicted_value.is_some());
    let training =
        Dataset::load(study.config().dataset_path(DatasetRole::Training), 2).unwrap();
    assert_eq!(training.len(), 6);
    cleanup(study.config());
}

#[test]
fn objective_check_recomputes_a_stored_sample() {
    let (eval, mut study) = study(small_config());
    study.run_job(JobType::GenerateTraining).unwrap();

    let check = study.check_objective().unwrap();
    assert!(check.index < 6);
    assert!((check.recorded - check.recomputed).abs() < 1e-4);
    assert_eq!(eval.jobs(), 7);
    cleanup(study.config());
}

#[test]
fn objective_check_can_run_before_the_loop() {
    let mut config = never_converging(1);
    config.check_objective = true;
    let (eval, mut study) = study(config);

    study.run().unwrap();
    // Training, testing, the check, then one candidate.
    assert_eq!(eval.jobs(), 6 + 2 + 1 + 1);
    cleanup(study.config());
}

#[test]
fn optimization_creates_missing_tables() {
    let (_, mut study) = study(never_converging(1));
    assert!(!study.config().work_dir.exists());

    let outcome = study.run_job(JobType::RunOptimization).unwrap();
    assert!(matches!(outcome, Outcome::NeedMorePoints { iterations: 1, .. }));
    assert!(study.config().dataset_path(DatasetRole::Training).is_file());
    assert!(study.config().dataset_path(DatasetRole::Testing).is_file());
    cleanup(study.config());
}
