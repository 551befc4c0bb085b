use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::objective::{CompositeObjective, ExternalEvaluator};
use crate::search::GlobalSearch;

use super::Study;

/// A builder for constructing [`Study`] instances with a fluent API.
///
/// Created via [`Study::builder()`]. Starts from a [`Config`] and lets
/// callers plug in the evaluator and override the most common knobs before
/// the configuration is validated.
///
/// # Examples
///
/// ```
/// use basis_optimizer::objective::{ExternalEvaluator, MolecularSystem};
/// use basis_optimizer::parameter::{Bounds, OrbitalType, ParameterSpace};
/// use basis_optimizer::{Config, Result, Study};
///
/// struct Noop;
///
/// impl ExternalEvaluator for Noop {
///     fn run_job(&self, _: &[f64], _: &MolecularSystem) -> Result<()> { Ok(()) }
///     fn density_error(&self, _: &MolecularSystem) -> Result<f64> { Ok(0.0) }
///     fn state_energies(&self, _: &MolecularSystem) -> Result<Vec<f64>> { Ok(vec![0.0]) }
///     fn reference_state_energies(&self, _: &MolecularSystem) -> Result<Vec<f64>> { Ok(vec![0.0]) }
///     fn write_job_inputs(&self, _: &[f64], _: &str) -> Result<()> { Ok(()) }
/// }
///
/// let space = ParameterSpace::new(
///     vec![Bounds::new(0.01, 20.0).unwrap()],
///     vec![OrbitalType::S],
/// )
/// .unwrap();
/// let config = Config::new(space, vec![MolecularSystem::new("h2", 1)]);
///
/// let study = Study::builder(config)
///     .evaluator(Noop)
///     .work_dir(std::env::temp_dir())
///     .max_iterations(3)
///     .build()
///     .unwrap();
/// assert_eq!(study.config().max_iterations, 3);
/// ```
pub struct StudyBuilder<E> {
    config: Config,
    evaluator: Option<Arc<E>>,
}

impl<E: ExternalEvaluator + 'static> StudyBuilder<E> {
    /// Create a new builder around `config`.
    pub(super) fn new(config: Config) -> Self {
        Self {
            config,
            evaluator: None,
        }
    }

    /// Set the external collaborator.
    #[must_use]
    pub fn evaluator(mut self, evaluator: E) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    /// Set a shared external collaborator.
    #[must_use]
    pub fn shared_evaluator(mut self, evaluator: Arc<E>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Override the work directory.
    #[must_use]
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    /// Override the iteration cap.
    #[must_use]
    pub fn max_iterations(mut self, n: usize) -> Self {
        self.config.max_iterations = n;
        self
    }

    /// Override the convergence tolerance.
    #[must_use]
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Validate the configuration and build the [`Study`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when no evaluator was set or the
    /// configuration is inconsistent.
    pub fn build(self) -> Result<Study<E>> {
        self.config.validate()?;
        let evaluator = self
            .evaluator
            .ok_or_else(|| Error::InvalidConfig("no external evaluator configured".into()))?;

        let config = self.config;
        let objective = CompositeObjective::new(
            evaluator,
            config.systems.clone(),
            config.weights,
            config.parameters.clone(),
        )
        .linear_independence(config.linear_independence)
        .parallel(config.parallel_jobs);
        let search = GlobalSearch::new(config.search.clone())
            .linear_independence(config.linear_independence);
        let rng = config
            .search
            .seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);

        Ok(Study {
            config,
            objective,
            search,
            rng,
            state: None,
        })
    }
}
