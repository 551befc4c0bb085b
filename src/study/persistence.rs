use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::objective::PenaltyWeights;
use crate::storage;
use crate::surrogate::FitReport;

/// Schema version written into every state file.
const STATE_VERSION: u32 = 1;

/// Where the loop controller is in its cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Creating or reusing the training and testing tables.
    #[default]
    Bootstrap,
    /// Fitting the surrogate and searching it.
    FitAndSearch,
    /// Evaluating the true penalty at the candidate.
    Evaluate,
    /// Comparing prediction and truth.
    CheckConvergence,
    /// Appending the new sample and persisting the tables.
    Augment,
    /// Finished, converged or not.
    Terminated,
}

/// Persisted progress of the optimization loop.
///
/// Written to `state.json` in the work directory after every phase
/// transition, so a resumed run continues from an explicit state instead of
/// guessing from which files happen to exist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationState {
    /// Schema version for forward compatibility.
    pub version: u32,
    /// Completed augment rounds.
    pub iteration: usize,
    /// Parameters of the lowest true penalty seen at a candidate.
    pub best_parameters: Option<Vec<f64>>,
    /// Lowest true penalty seen at a candidate.
    pub best_value: Option<f64>,
    /// Surrogate prediction at the latest candidate.
    pub predicted_value: Option<f64>,
    /// Whether the loop has converged.
    pub converged: bool,
    /// Current phase.
    pub phase: Phase,
    /// Weights the stored samples were computed with.
    pub weights: PenaltyWeights,
    /// Diagnostics of the latest surrogate fit.
    #[serde(default)]
    pub last_fit: Option<FitReport>,
}

impl OptimizationState {
    /// Fresh state for a run with the given weights.
    #[must_use]
    pub fn new(weights: PenaltyWeights) -> Self {
        Self {
            version: STATE_VERSION,
            iteration: 0,
            best_parameters: None,
            best_value: None,
            predicted_value: None,
            converged: false,
            phase: Phase::Bootstrap,
            weights,
            last_fit: None,
        }
    }

    /// Whether the loop must not run further under `max_iterations`.
    #[must_use]
    pub fn is_terminal(&self, max_iterations: usize) -> bool {
        self.converged || self.iteration >= max_iterations
    }

    /// Record a true evaluation at `parameters`, keeping the lowest one.
    pub(crate) fn record(&mut self, parameters: &[f64], value: f64) {
        if self.best_value.is_none_or(|best| value < best) {
            self.best_value = Some(value);
            self.best_parameters = Some(parameters.to_vec());
        }
    }

    /// Read the state at `path`, or `None` when no state was written yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when the file exists but cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Storage(format!("{}: {e}", path.display())))
    }

    /// Atomically replace the state file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| Error::Storage(e.to_string()))?;
        storage::atomic_write(path.as_ref(), &json)
    }

    /// Fail with [`Error::WeightMismatch`] unless `weights` equal the
    /// recorded ones.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn check_weights(&self, weights: &PenaltyWeights) -> Result<()> {
        if self.weights == *weights {
            Ok(())
        } else {
            Err(Error::WeightMismatch)
        }
    }
}
