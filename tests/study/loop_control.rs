use std::sync::Arc;

use basis_optimizer::dataset::Dataset;
use basis_optimizer::parameter::{Bounds, OrbitalType, ParameterSpace};
use basis_optimizer::{DatasetRole, OptimizationState, Outcome, Phase, Study};

use crate::support::{Quadratic, cleanup, never_converging, small_config};

fn study(config: basis_optimizer::Config) -> (Arc<Quadratic>, Study<Quadratic>) {
    let eval = Arc::new(Quadratic::default());
    let study = Study::builder(config)
        .shared_evaluator(Arc::clone(&eval))
        .build()
        .unwrap();
    (eval, study)
}

#[test]
fn generous_tolerance_converges_on_first_candidate() {
    let mut config = small_config();
    config.tolerance = 50.0;
    let (eval, mut study) = study(config);

    let outcome = study.run().unwrap();
    let Outcome::Converged {
        parameters,
        value,
        predicted,
        iterations,
    } = outcome
    else {
        panic!("expected convergence, got {outcome:?}");
    };

    assert_eq!(iterations, 0);
    assert!((predicted - value).abs() < 50.0);
    assert!(study.config().parameters.contains(&parameters));
    let expected: f64 = parameters.iter().map(|x| x * x).sum();
    assert!((value - expected).abs() < 1e-12);
    // 6 training points, 2 testing points, 1 candidate.
    assert_eq!(eval.jobs(), 9);

    let state = OptimizationState::load(study.config().state_path())
        .unwrap()
        .unwrap();
    assert!(state.converged);
    assert_eq!(state.phase, Phase::Terminated);
    assert_eq!(state.iteration, 0);
    let fit = state.last_fit.as_ref().unwrap();
    assert_eq!(fit.n_training, 6);
    assert!(fit.log_marginal_likelihood.is_finite());
    assert!(fit.validation_rmse.is_some_and(f64::is_finite));
    let stored = state.best_parameters.unwrap();
    for (a, b) in stored.iter().zip(&parameters) {
        assert!((a - b).abs() < 1e-12);
    }
    assert_eq!(study.state().map(|s| s.phase), Some(Phase::Terminated));

    let training = Dataset::load(study.config().dataset_path(DatasetRole::Training), 2).unwrap();
    assert_eq!(training.len(), 6, "a converged candidate is not appended");
    cleanup(study.config());
}

#[test]
fn iteration_cap_ends_with_need_more_points() {
    let (eval, mut study) = study(never_converging(2));

    let outcome = study.run().unwrap();
    let Outcome::NeedMorePoints { best, iterations } = outcome else {
        panic!("expected the cap to be hit, got {outcome:?}");
    };
    assert_eq!(iterations, 2);
    assert_eq!(eval.jobs(), 6 + 2 + 2);

    let training = Dataset::load(study.config().dataset_path(DatasetRole::Training), 2).unwrap();
    assert_eq!(training.len(), 8);
    let best = best.unwrap();
    assert!((best.value - training.minimum().unwrap().value).abs() < 1e-6);

    let state = study.state().unwrap();
    assert_eq!(state.iteration, 2);
    assert_eq!(state.phase, Phase::Terminated);
    assert!(!state.converged);
    assert!(state.best_value.is_some());
    assert!(state.predicted_value.is_some());
    cleanup(study.config());
}

#[test]
fn new_samples_can_be_mirrored_into_testing() {
    let mut config = never_converging(1);
    config.mirror_into_testing = true;
    let (_, mut study) = study(config);

    study.run().unwrap();
    let testing = Dataset::load(study.config().dataset_path(DatasetRole::Testing), 2).unwrap();
    assert_eq!(testing.len(), 3);
    cleanup(study.config());
}

#[test]
fn wide_bounds_loop_finds_the_lower_corner() {
    // x0² + x1² on [0.01, 20] × [0.01, 50]: the minimum sits in the
    // lower corner (0.01, 0.01).
    let space = ParameterSpace::new(
        vec![Bounds::new(0.01, 20.0).unwrap(), Bounds::new(0.01, 50.0).unwrap()],
        vec![OrbitalType::S, OrbitalType::S],
    )
    .unwrap();
    let mut config = small_config();
    config.parameters = space;
    config.training.size = 5;
    config.max_iterations = 10;
    config.tolerance = 1.0;
    let (_, mut study) = study(config);

    let Outcome::Converged {
        parameters,
        value,
        predicted,
        iterations,
    } = study.run().unwrap()
    else {
        panic!("wide-bounds run did not converge");
    };
    assert!(value < 1.0, "value {value}");
    assert!((predicted - value).abs() < 1.0);
    assert!(iterations <= 10);
    assert!(parameters.iter().all(|&p| (0.01..1.0).contains(&p)), "{parameters:?}");

    let state = study.state().unwrap();
    assert!(state.converged);
    let training = Dataset::load(study.config().dataset_path(DatasetRole::Training), 2).unwrap();
    assert_eq!(training.len(), 5 + state.iteration);
    cleanup(study.config());
}
