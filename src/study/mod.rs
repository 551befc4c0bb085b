//! The optimization loop controller.
//!
//! A [`Study`] owns the configuration, the composite objective and the
//! search, and drives the explicit phase machine
//!
//! ```text
//! Bootstrap → FitAndSearch → Evaluate → CheckConvergence → Augment ─┐
//!                  ▲                           │                   │
//!                  └───────────────────────────┼───────────────────┘
//!                                              └→ Terminated
//! ```
//!
//! The [`OptimizationState`] is written to `state.json` after every
//! transition and the tables are replaced atomically, so an interrupted run
//! resumes from the last completed round. One run owns a work directory at
//! a time ([`RunLock`]).
//!
//! Hitting the iteration cap is not an error: the run ends with
//! [`Outcome::NeedMorePoints`].

mod builder;
mod persistence;

use std::sync::Arc;

pub use builder::StudyBuilder;
pub use persistence::{OptimizationState, Phase};

use crate::config::Config;
use crate::dataset::{self, Dataset, Sample};
use crate::error::{Error, Result};
use crate::objective::{CompositeObjective, ExternalEvaluator, ShellEvaluator};
use crate::search::GlobalSearch;
use crate::storage::RunLock;
use crate::surrogate::GaussianProcess;
use crate::types::{DatasetRole, JobType};

/// How a run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Prediction and truth agreed at the candidate.
    Converged {
        /// The converged parameters.
        parameters: Vec<f64>,
        /// True penalty at `parameters`.
        value: f64,
        /// Surrogate prediction at `parameters`.
        predicted: f64,
        /// Augment rounds completed before convergence.
        iterations: usize,
    },
    /// The iteration cap was reached without convergence.
    NeedMorePoints {
        /// Lowest-penalty training sample.
        best: Option<Sample>,
        /// Augment rounds completed.
        iterations: usize,
    },
    /// A dataset table was created or found.
    DatasetReady {
        /// Which table.
        role: DatasetRole,
        /// Number of samples in it.
        samples: usize,
    },
    /// Job inputs were written for later batch evaluation; nothing was
    /// evaluated.
    InputsWritten {
        /// Number of input sets written.
        count: usize,
    },
}

/// A stored training sample re-evaluated through the objective.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectiveCheck {
    /// Row of the training table.
    pub index: usize,
    /// Parameters of that row.
    pub parameters: Vec<f64>,
    /// Value stored in the table.
    pub recorded: f64,
    /// Value computed now.
    pub recomputed: f64,
}

/// Surrogate-driven optimization over an [`ExternalEvaluator`].
pub struct Study<E> {
    config: Config,
    objective: CompositeObjective<E>,
    search: GlobalSearch,
    rng: fastrand::Rng,
    state: Option<OptimizationState>,
}

impl<E: ExternalEvaluator + 'static> Study<E> {
    /// Creates a builder for configuring a `Study`.
    #[must_use]
    pub fn builder(config: Config) -> StudyBuilder<E> {
        StudyBuilder::new(config)
    }

    /// Creates a study from a configuration and an evaluator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an inconsistent configuration.
    pub fn new(config: Config, evaluator: E) -> Result<Self> {
        Self::builder(config).evaluator(evaluator).build()
    }

    /// The configuration this study runs with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The objective, for evaluating points outside the loop.
    #[must_use]
    pub fn objective(&self) -> &CompositeObjective<E> {
        &self.objective
    }

    /// State of the latest optimization run, if one ran.
    #[must_use]
    pub fn state(&self) -> Option<&OptimizationState> {
        self.state.as_ref()
    }

    /// Run the configured job type.
    ///
    /// # Errors
    ///
    /// Propagates every failure; see [`run_job`](Self::run_job).
    pub fn run(&mut self) -> Result<Outcome> {
        self.run_job(self.config.job_type)
    }

    /// Run one job type while holding the work-directory lock.
    ///
    /// - `GenerateTraining` / `GenerateTesting`: create the table unless it
    ///   exists.
    /// - `RunOptimization`: create the testing table if it is missing, then
    ///   run the loop. The training table must exist or be creatable.
    /// - `All`: everything above, in order. Stops early when training
    ///   generation only wrote job inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when another run holds the lock, and
    /// propagates every dataset, objective, surrogate and search failure.
    pub fn run_job(&mut self, job: JobType) -> Result<Outcome> {
        std::fs::create_dir_all(&self.config.work_dir)?;
        let _lock = RunLock::acquire(&self.config.work_dir)?;
        trace_info!(?job, work_dir = %self.config.work_dir.display(), "job started");

        let outcome = match job {
            JobType::GenerateTraining => self.ensure_dataset(DatasetRole::Training)?,
            JobType::GenerateTesting => self.ensure_dataset(DatasetRole::Testing)?,
            JobType::RunOptimization | JobType::All => self.prepare_and_optimize()?,
        };
        trace_info!(?outcome, "job complete");
        Ok(outcome)
    }

    fn prepare_and_optimize(&mut self) -> Result<Outcome> {
        let training = self.ensure_dataset(DatasetRole::Training)?;
        if matches!(training, Outcome::InputsWritten { .. }) {
            return Ok(training);
        }
        self.ensure_dataset(DatasetRole::Testing)?;
        if self.config.check_objective {
            self.check_objective()?;
        }
        self.optimize()
    }

    /// Create the table for `role` unless it already exists.
    ///
    /// Bootstrap points are all evaluated before the table is written, so a
    /// failure leaves no partial table behind.
    fn ensure_dataset(&self, role: DatasetRole) -> Result<Outcome> {
        let path = self.config.dataset_path(role);
        let n_params = self.config.n_params();
        if path.is_file() {
            let existing = Dataset::load(&path, n_params)?;
            trace_info!(%role, samples = existing.len(), "reusing existing dataset");
            return Ok(Outcome::DatasetReady {
                role,
                samples: existing.len(),
            });
        }

        let spec = self.config.dataset(role);
        let points = dataset::bootstrap(spec.size, &self.config.parameters, spec.seed);
        trace_info!(%role, size = points.len(), seed = spec.seed, "bootstrapping dataset");

        if role == DatasetRole::Training && !self.config.evaluate_training_set {
            for (i, p) in points.iter().enumerate() {
                self.objective.write_job_inputs(p, &i.to_string())?;
            }
            trace_info!(count = points.len(), "training inputs written");
            return Ok(Outcome::InputsWritten {
                count: points.len(),
            });
        }

        let mut data = Dataset::new();
        for p in points {
            let value = self.objective.evaluate(&p)?;
            trace_debug!(%role, ?p, value, "bootstrap point evaluated");
            data.push(Sample::new(p, value));
        }
        data.save(&path)?;
        Ok(Outcome::DatasetReady {
            role,
            samples: data.len(),
        })
    }

    /// Re-evaluate a random training sample and compare it with the stored
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingFile`] without a training table,
    /// [`Error::EmptyDataset`] for an empty one, and propagates objective
    /// failures.
    pub fn check_objective(&mut self) -> Result<ObjectiveCheck> {
        let path = self.config.dataset_path(DatasetRole::Training);
        let training = Dataset::load(&path, self.config.n_params())?;
        if training.is_empty() {
            return Err(Error::EmptyDataset);
        }
        let index = self.rng.usize(..training.len());
        let sample = &training.samples()[index];
        let recomputed = self.objective.evaluate(&sample.parameters)?;
        trace_info!(
            index,
            recorded = sample.value,
            recomputed,
            "objective check"
        );
        Ok(ObjectiveCheck {
            index,
            parameters: sample.parameters.clone(),
            recorded: sample.value,
            recomputed,
        })
    }

    /// The training copy the surrogate is fitted on: optionally sanitized
    /// for linear independence, then de-duplicated. The stored table is
    /// left as is.
    fn fit_data(&self, training: &Dataset) -> Dataset {
        let li = &self.config.linear_independence;
        let sanitized = if li.enabled && li.apply_to_training {
            training.enforce_linear_independence(
                &self.config.parameters,
                li.tolerance,
                li.penalty_value,
            )
        } else {
            training.clone()
        };
        let fit = sanitized.deduplicate(self.config.duplicate_tolerance);
        trace_debug!(
            samples = fit.len(),
            stored = training.len(),
            highest = ?fit.maximum().map(|s| s.value),
            "training copy sanitized"
        );
        fit
    }

    fn persist(&mut self, state: &OptimizationState) -> Result<()> {
        state.save(self.config.state_path())?;
        self.state = Some(state.clone());
        Ok(())
    }

    fn transition(&mut self, state: &mut OptimizationState, phase: Phase) -> Result<()> {
        trace_debug!(from = ?state.phase, to = ?phase, iteration = state.iteration, "phase");
        state.phase = phase;
        self.persist(state)
    }

    /// Run the surrogate loop on the existing tables.
    fn optimize(&mut self) -> Result<Outcome> {
        let max_iterations = self.config.max_iterations;
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("optimize", max_iterations).entered();

        let state_path = self.config.state_path();
        let mut state = match OptimizationState::load(&state_path)? {
            Some(state) => {
                state.check_weights(&self.config.weights)?;
                trace_info!(iteration = state.iteration, "resuming");
                state
            }
            None => OptimizationState::new(self.config.weights),
        };

        let n_params = self.config.n_params();
        let training_path = self.config.dataset_path(DatasetRole::Training);
        let testing_path = self.config.dataset_path(DatasetRole::Testing);
        let mut training = Dataset::load(&training_path, n_params)?;
        let mut testing = Dataset::load(&testing_path, n_params)?;

        while !state.is_terminal(max_iterations) {
            self.transition(&mut state, Phase::FitAndSearch)?;
            let fit_data = self.fit_data(&training);
            let model =
                GaussianProcess::fit(&fit_data, &self.config.surrogate, &self.config.parameters)?;
            let report = model.report(Some(&testing))?;
            trace_info!(
                iteration = state.iteration,
                n_training = report.n_training,
                log_marginal_likelihood = report.log_marginal_likelihood,
                validation_rmse = ?report.validation_rmse,
                "surrogate ready"
            );
            state.last_fit = Some(report);

            let found = self
                .search
                .search(&model, &fit_data, &self.config.parameters, &mut self.rng)?;
            let candidate = found.candidate;
            state.predicted_value = Some(candidate.predicted_value);

            if !self.config.evaluate_candidate {
                self.objective.write_job_inputs(&candidate.parameters, "candidate")?;
                self.transition(&mut state, Phase::Terminated)?;
                trace_info!(parameters = ?candidate.parameters, "candidate inputs written");
                return Ok(Outcome::InputsWritten { count: 1 });
            }

            self.transition(&mut state, Phase::Evaluate)?;
            let value = self.objective.evaluate(&candidate.parameters)?;
            state.record(&candidate.parameters, value);

            self.transition(&mut state, Phase::CheckConvergence)?;
            let predicted = candidate.predicted_value;
            let diff = predicted - value;
            trace_info!(
                iteration = state.iteration,
                predicted,
                computed = value,
                difference = diff,
                "candidate evaluated"
            );

            if diff.abs() < self.config.tolerance && predicted < self.config.sanity_ceiling {
                state.converged = true;
                state.best_parameters = Some(candidate.parameters.clone());
                state.best_value = Some(value);
                self.transition(&mut state, Phase::Terminated)?;
                trace_info!(parameters = ?candidate.parameters, value, "valid minimum found");
                return Ok(Outcome::Converged {
                    parameters: candidate.parameters,
                    value,
                    predicted,
                    iterations: state.iteration,
                });
            }

            self.transition(&mut state, Phase::Augment)?;
            let sample = Sample::new(candidate.parameters, value);
            if self.config.mirror_into_testing {
                testing.push(sample.clone());
                testing.save(&testing_path)?;
            }
            training.push(sample);
            training.save(&training_path)?;
            state.iteration += 1;
            self.persist(&state)?;
        }

        self.finish(state, &training)
    }

    /// Report a run that has nothing left to do: a stored convergence, or
    /// the iteration cap.
    fn finish(&mut self, mut state: OptimizationState, training: &Dataset) -> Result<Outcome> {
        if state.converged {
            let outcome = Outcome::Converged {
                parameters: state.best_parameters.clone().unwrap_or_default(),
                value: state.best_value.unwrap_or(f64::NAN),
                predicted: state.predicted_value.unwrap_or(f64::NAN),
                iterations: state.iteration,
            };
            self.state = Some(state);
            return Ok(outcome);
        }

        self.transition(&mut state, Phase::Terminated)?;
        let best = training.minimum().cloned();
        trace_info!(
            iterations = state.iteration,
            best = ?best.as_ref().map(|b| b.value),
            "need more points"
        );
        Ok(Outcome::NeedMorePoints {
            best,
            iterations: state.iteration,
        })
    }
}

impl Study<ShellEvaluator> {
    /// Creates a study running jobs through the `shell` section of
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] without a `shell` section or for an
    /// inconsistent configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let evaluator = Arc::new(config.shell_evaluator()?);
        Self::builder(config).shared_evaluator(evaluator).build()
    }
}
