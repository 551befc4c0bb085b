use std::sync::Arc;

use basis_optimizer::dataset::Dataset;
use basis_optimizer::objective::PenaltyWeights;
use basis_optimizer::{Config, DatasetRole, Error, OptimizationState, Outcome, Phase, Study};

use crate::support::{Quadratic, cleanup, never_converging, small_config};

fn run(config: &Config) -> (Arc<Quadratic>, basis_optimizer::Result<Outcome>) {
    let eval = Arc::new(Quadratic::default());
    let mut study = Study::builder(config.clone())
        .shared_evaluator(Arc::clone(&eval))
        .build()
        .unwrap();
    let outcome = study.run();
    (eval, outcome)
}

#[test]
fn raising_the_cap_continues_where_the_run_stopped() {
    let mut config = never_converging(2);
    let (_, first) = run(&config);
    assert!(matches!(
        first.unwrap(),
        Outcome::NeedMorePoints { iterations: 2, .. }
    ));

    config.max_iterations = 3;
    let (eval, second) = run(&config);
    assert!(matches!(
        second.unwrap(),
        Outcome::NeedMorePoints { iterations: 3, .. }
    ));
    assert_eq!(eval.jobs(), 1, "only the new candidate is evaluated");

    let training = Dataset::load(config.dataset_path(DatasetRole::Training), 2).unwrap();
    assert_eq!(training.len(), 6 + 3);
    cleanup(&config);
}

#[test]
fn finished_run_is_not_repeated() {
    let config = never_converging(1);
    run(&config).1.unwrap();

    let (eval, again) = run(&config);
    assert!(matches!(
        again.unwrap(),
        Outcome::NeedMorePoints { iterations: 1, .. }
    ));
    assert_eq!(eval.jobs(), 0);
    cleanup(&config);
}

#[test]
fn converged_run_reports_its_result_again() {
    let mut config = small_config();
    config.tolerance = 50.0;
    let (_, first) = run(&config);
    let Outcome::Converged { value, .. } = first.unwrap() else {
        panic!("expected convergence");
    };

    let (eval, again) = run(&config);
    let Outcome::Converged {
        value: again_value,
        iterations,
        ..
    } = again.unwrap()
    else {
        panic!("expected the stored convergence");
    };
    assert!((again_value - value).abs() < 1e-12);
    assert_eq!(iterations, 0);
    assert_eq!(eval.jobs(), 0);
    cleanup(&config);
}

#[test]
fn changed_weights_refuse_to_resume() {
    let mut config = never_converging(1);
    run(&config).1.unwrap();

    config.max_iterations = 2;
    config.weights = PenaltyWeights {
        density: 2.0,
        ..PenaltyWeights::density_only()
    };
    let (eval, outcome) = run(&config);
    assert!(matches!(outcome, Err(Error::WeightMismatch)));
    assert_eq!(eval.jobs(), 0);
    cleanup(&config);
}

#[test]
fn state_file_records_every_round() {
    let config = never_converging(2);
    run(&config).1.unwrap();

    let state = OptimizationState::load(config.state_path()).unwrap().unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.iteration, 2);
    assert_eq!(state.phase, Phase::Terminated);
    assert_eq!(state.weights, PenaltyWeights::density_only());

    let text = std::fs::read_to_string(config.state_path()).unwrap();
    assert!(text.contains("\"phase\": \"terminated\""), "{text}");
    cleanup(&config);
}

#[test]
fn interrupted_round_restarts_from_the_tables() {
    let config = never_converging(2);
    run(&config).1.unwrap();

    // Pretend the process died during the next round's evaluation.
    let mut state = OptimizationState::load(config.state_path()).unwrap().unwrap();
    state.iteration = 1;
    state.phase = Phase::Evaluate;
    state.save(config.state_path()).unwrap();

    let (eval, outcome) = run(&config);
    assert!(matches!(
        outcome.unwrap(),
        Outcome::NeedMorePoints { iterations: 2, .. }
    ));
    assert_eq!(eval.jobs(), 1);
    cleanup(&config);
}
