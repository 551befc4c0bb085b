//! Multi-start global minimization of the surrogate mean.
//!
//! Each start is a training point. From every start a basin-hopping run
//! with a bounded Nelder–Mead local minimizer explores the predicted
//! penalty surface, working in unit-cube coordinates so one step size fits
//! every dimension. The lowest minimum over all starts becomes the
//! [`Candidate`]. When the linear-independence guard applies to the
//! surrogate, starts are compared on the penalized value. Strict comparison
//! means the earliest start wins ties.
//!
//! Optionally, minima predicted at or below `edge_threshold` are discarded
//! and each start reports its lowest remaining minimum instead. Such
//! "holes" usually sit on the edge of the parameter range where the
//! surrogate extrapolates below any physically possible penalty.

mod basin_hopping;
pub(crate) mod nelder_mead;

use serde::{Deserialize, Serialize};

use self::basin_hopping::BasinHopping;
use self::nelder_mead::{LocalMinimum, NelderMead};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::objective::LinearIndependenceConfig;
use crate::parameter::ParameterSpace;
use crate::surrogate::GaussianProcess;

/// Global search options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of starting points drawn from the training set.
    pub n_starts: usize,
    /// Use the training minimum as the first start.
    pub start_from_minimum: bool,
    /// Basin-hopping iterations per start.
    pub niter: usize,
    /// Maximum random displacement, as a fraction of each dimension's width.
    pub step_size: f64,
    /// Metropolis temperature.
    pub temperature: f64,
    /// Simplex iterations of each local minimization.
    pub local_max_iter: usize,
    /// Skip minima predicted at or below `edge_threshold`.
    pub reject_edge_minima: bool,
    /// Threshold for [`reject_edge_minima`](Self::reject_edge_minima).
    pub edge_threshold: f64,
    /// Seed of the start draws and the hops.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_starts: 5,
            start_from_minimum: false,
            niter: 1000,
            step_size: 0.5,
            temperature: 1.0,
            local_max_iter: 200,
            reject_edge_minima: false,
            edge_threshold: 1e-4,
            seed: None,
        }
    }
}

impl SearchConfig {
    /// Check the knobs for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.n_starts == 0 {
            return Err(Error::InvalidConfig("search needs at least one start".into()));
        }
        if self.step_size.is_nan() || self.step_size <= 0.0 || self.step_size.is_infinite() {
            return Err(Error::InvalidConfig(format!(
                "search step size must be positive, got {}",
                self.step_size
            )));
        }
        if self.temperature.is_nan() || self.temperature < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "search temperature must be non-negative, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// The surrogate's predicted minimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Parameter vector, inside the bounds.
    pub parameters: Vec<f64>,
    /// Surrogate mean at `parameters`.
    pub predicted_value: f64,
    /// Index of the winning start in [`SearchOutcome::starts`].
    pub start_index: usize,
}

/// Result of one start.
#[derive(Clone, Debug, PartialEq)]
pub struct StartResult {
    /// Index of the training sample the run started from.
    pub training_index: usize,
    /// Stored penalty of that training sample.
    pub start_value: f64,
    /// Lowest accepted minimum found; the start point itself when the start
    /// is rejected.
    pub parameters: Vec<f64>,
    /// Surrogate mean at `parameters`.
    pub predicted_value: f64,
    /// Whether every minimum this start found was discarded as an edge
    /// minimum.
    pub rejected: bool,
}

/// Winning candidate plus every start, for reporting.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchOutcome {
    /// The lowest accepted minimum.
    pub candidate: Candidate,
    /// Per-start results in start order.
    pub starts: Vec<StartResult>,
}

/// Multi-start basin-hopping search over a fitted surrogate.
#[derive(Clone, Debug)]
pub struct GlobalSearch {
    config: SearchConfig,
    linear_independence: Option<LinearIndependenceConfig>,
}

impl GlobalSearch {
    /// Creates a search with the given options.
    #[must_use]
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            linear_independence: None,
        }
    }

    /// Adds the linear-independence penalty to the surrogate objective.
    ///
    /// Has no effect unless both `enabled` and `apply_to_surrogate` are set.
    #[must_use]
    pub fn linear_independence(mut self, config: LinearIndependenceConfig) -> Self {
        self.linear_independence =
            (config.enabled && config.apply_to_surrogate).then_some(config);
        self
    }

    /// The configured options.
    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Pick the start indices: `n_starts` uniform draws from the training
    /// set, the first replaced by the training minimum when requested.
    fn start_indices(&self, training: &Dataset, rng: &mut fastrand::Rng) -> Vec<usize> {
        let mut starts: Vec<usize> = (0..self.config.n_starts)
            .map(|_| rng.usize(..training.len()))
            .collect();
        if self.config.start_from_minimum
            && let Some(min) = training.minimum_index()
        {
            starts[0] = min;
        }
        starts
    }

    /// Search `model` for its lowest predicted value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyDataset`] without training points to start
    /// from, [`Error::NoAcceptableCandidate`] when no start found a minimum
    /// above the edge threshold, and [`Error::LocalSearch`] when the local
    /// minimizer fails.
    pub fn search(
        &self,
        model: &GaussianProcess,
        training: &Dataset,
        space: &ParameterSpace,
        rng: &mut fastrand::Rng,
    ) -> Result<SearchOutcome> {
        self.config.validate()?;
        if training.is_empty() {
            return Err(Error::EmptyDataset);
        }
        for sample in training {
            space.check_len(&sample.parameters)?;
        }

        let opts = BasinHopping {
            niter: self.config.niter,
            step_size: self.config.step_size,
            temperature: self.config.temperature,
            local: NelderMead {
                max_iter: u64::try_from(self.config.local_max_iter).unwrap_or(u64::MAX),
                ..NelderMead::default()
            },
        };
        let n = space.len();
        let lower = vec![0.0; n];
        let upper = vec![1.0; n];
        let li = self.linear_independence;

        let surrogate = |u: &[f64]| {
            let x = space.from_unit(u);
            let mut value = model.predict_mean(&x);
            if let Some(li) = li
                && space.is_linearly_dependent(&x, li.tolerance)
            {
                value += li.penalty_value;
            }
            value
        };

        let reject = self.config.reject_edge_minima;
        let threshold = self.config.edge_threshold;
        let admissible = |m: &LocalMinimum| {
            !reject || model.predict_mean(&space.clamp(&space.from_unit(&m.x))) > threshold
        };

        let mut starts = Vec::with_capacity(self.config.n_starts);
        // Starts compete on the penalized surrogate, not the bare mean.
        let mut winner: Option<(usize, f64)> = None;
        for (j, idx) in self.start_indices(training, rng).into_iter().enumerate() {
            let start = &training.samples()[idx];
            let u0 = space.to_unit(&start.parameters);
            let found = basin_hopping::basin_hopping(
                &surrogate,
                &admissible,
                &u0,
                &lower,
                &upper,
                &opts,
                rng,
            )?;

            let result = match &found {
                Some(local) => {
                    let parameters = space.clamp(&space.from_unit(&local.x));
                    StartResult {
                        training_index: idx,
                        start_value: start.value,
                        predicted_value: model.predict_mean(&parameters),
                        parameters,
                        rejected: false,
                    }
                }
                None => StartResult {
                    training_index: idx,
                    start_value: start.value,
                    predicted_value: model.predict_mean(&start.parameters),
                    parameters: start.parameters.clone(),
                    rejected: true,
                },
            };

            trace_info!(
                start = j,
                training_index = idx,
                start_value = start.value,
                predicted_value = result.predicted_value,
                rejected = result.rejected,
                "search start finished"
            );

            if let Some(local) = found
                && winner.is_none_or(|(_, score)| local.value < score)
            {
                winner = Some((j, local.value));
            }
            starts.push(result);
        }

        let Some((best, _)) = winner else {
            return Err(Error::NoAcceptableCandidate);
        };
        let chosen = &starts[best];
        let candidate = Candidate {
            parameters: chosen.parameters.clone(),
            predicted_value: chosen.predicted_value,
            start_index: best,
        };
        trace_info!(
            start_index = best,
            predicted_value = candidate.predicted_value,
            "candidate selected"
        );
        Ok(SearchOutcome { candidate, starts })
    }
}
