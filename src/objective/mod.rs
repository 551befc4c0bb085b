//! The composite penalty function being minimized.
//!
//! For a parameter vector `x` the penalty is
//!
//! ```text
//! P(x) = w_density · D(x) + w_excited · X(x) + w_ground · G(x) + w_states · S(x)
//! ```
//!
//! where every component is a sum over molecular systems of a per-system
//! root-mean-square error:
//!
//! | Component | Per-system error |
//! |-----------|------------------|
//! | `D` density | reported directly by the collaborator |
//! | `G` ground state | `|E0 − E0_ref|` in hartree |
//! | `X` excited states | RMSE of excitation energies `(Ei − E0)` in cm⁻¹, systems with one state skipped |
//! | `S` all states | RMSE of absolute energy differences in cm⁻¹ |
//!
//! A component whose weight is zero is never computed, and when every weight
//! is zero no external job is run at all.
//!
//! # Examples
//!
//! ```
//! use basis_optimizer::objective::{rmse, HARTREE_TO_WAVENUMBER};
//!
//! assert!((rmse(&[3.0, -3.0]) - 3.0).abs() < 1e-12);
//! assert_eq!(HARTREE_TO_WAVENUMBER, 219_474.63);
//! ```

mod external;
mod shell;

use std::sync::Arc;

pub use external::{ExternalEvaluator, MolecularSystem};
use serde::{Deserialize, Serialize};
pub use shell::{
    CONTRACTED_SHELL_MARKER, ContractionShell, DENSITY_MODE_VAR, DENSITY_POINTS_VAR, N_STATES_VAR,
    ShellConfig, ShellEvaluator, parse_state_energies,
};

use crate::error::{Error, Result};
use crate::parameter::ParameterSpace;

/// Hartree to wavenumber (cm⁻¹) conversion factor.
pub const HARTREE_TO_WAVENUMBER: f64 = 219_474.63;

/// Root-mean-square of `diffs`. Zero for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rmse(diffs: &[f64]) -> f64 {
    if diffs.is_empty() {
        return 0.0;
    }
    (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt()
}

/// Non-negative weights of the four penalty components.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PenaltyWeights {
    /// Weight of the density error.
    pub density: f64,
    /// Weight of the excited-state error.
    pub excited_states: f64,
    /// Weight of the ground-state error.
    pub ground_state: f64,
    /// Weight of the all-state error.
    #[serde(default)]
    pub states: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            density: 10.0,
            excited_states: 1.0,
            ground_state: 1.0,
            states: 0.0,
        }
    }
}

impl PenaltyWeights {
    /// Only the density component, with weight one.
    #[must_use]
    pub fn density_only() -> Self {
        Self {
            density: 1.0,
            excited_states: 0.0,
            ground_state: 0.0,
            states: 0.0,
        }
    }

    /// Whether every weight is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.density == 0.0
            && self.excited_states == 0.0
            && self.ground_state == 0.0
            && self.states == 0.0
    }

    /// Check that every weight is finite and non-negative.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending weight.
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("density", self.density),
            ("excited_states", self.excited_states),
            ("ground_state", self.ground_state),
            ("states", self.states),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "penalty weight '{name}' must be finite and non-negative, got {w}"
                )));
            }
        }
        Ok(())
    }
}

/// Unweighted component values of one penalty evaluation.
///
/// Components whose weight was zero are reported as `0.0`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PenaltyComponents {
    /// Summed density error.
    pub density: f64,
    /// Summed excited-state RMSE (cm⁻¹).
    pub excited_states: f64,
    /// Summed ground-state error (hartree).
    pub ground_state: f64,
    /// Summed all-state RMSE (cm⁻¹).
    pub states: f64,
}

impl PenaltyComponents {
    /// The weighted sum.
    #[must_use]
    pub fn total(&self, weights: &PenaltyWeights) -> f64 {
        weights.density * self.density
            + weights.excited_states * self.excited_states
            + weights.ground_state * self.ground_state
            + weights.states * self.states
    }
}

/// Linear-independence guard settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearIndependenceConfig {
    /// Master switch.
    pub enabled: bool,
    /// Minimum separation of two same-type exponents.
    pub tolerance: f64,
    /// Penalty assigned to a linearly dependent point.
    pub penalty_value: f64,
    /// Sanitize the training data before every fit.
    pub apply_to_training: bool,
    /// Add the penalty to the surrogate objective during the search.
    pub apply_to_surrogate: bool,
}

impl Default for LinearIndependenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tolerance: 0.5,
            penalty_value: 30_000.0,
            apply_to_training: true,
            apply_to_surrogate: false,
        }
    }
}

/// The weighted penalty function, backed by an [`ExternalEvaluator`].
pub struct CompositeObjective<E> {
    evaluator: Arc<E>,
    systems: Vec<MolecularSystem>,
    weights: PenaltyWeights,
    space: ParameterSpace,
    linear_independence: LinearIndependenceConfig,
    parallel: bool,
}

impl<E: ExternalEvaluator + 'static> CompositeObjective<E> {
    /// Creates an objective evaluating `systems` through `evaluator`.
    #[must_use]
    pub fn new(
        evaluator: Arc<E>,
        systems: Vec<MolecularSystem>,
        weights: PenaltyWeights,
        space: ParameterSpace,
    ) -> Self {
        Self {
            evaluator,
            systems,
            weights,
            space,
            linear_independence: LinearIndependenceConfig::default(),
            parallel: false,
        }
    }

    /// Enables the linear-independence short circuit.
    #[must_use]
    pub fn linear_independence(mut self, config: LinearIndependenceConfig) -> Self {
        self.linear_independence = config;
        self
    }

    /// Runs the jobs of independent systems concurrently.
    ///
    /// Only effective with the `async` feature; otherwise jobs run serially.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The configured weights.
    #[must_use]
    pub fn weights(&self) -> &PenaltyWeights {
        &self.weights
    }

    /// The collaborator.
    #[must_use]
    pub fn evaluator(&self) -> &Arc<E> {
        &self.evaluator
    }

    /// Evaluate the weighted penalty at `x`.
    ///
    /// # Errors
    ///
    /// Propagates every collaborator failure. Never substitutes a default.
    pub fn evaluate(&self, x: &[f64]) -> Result<f64> {
        self.space.check_len(x)?;
        let li = &self.linear_independence;
        if li.enabled && self.space.is_linearly_dependent(x, li.tolerance) {
            trace_debug!(?x, penalty = li.penalty_value, "linearly dependent point");
            return Ok(li.penalty_value);
        }
        let components = self.evaluate_components(x)?;
        let total = components.total(&self.weights);
        trace_debug!(?x, total, ?components, "penalty evaluated");
        Ok(total)
    }

    /// Run the jobs at `x` and return the unweighted components.
    ///
    /// # Errors
    ///
    /// Propagates every collaborator failure.
    pub fn evaluate_components(&self, x: &[f64]) -> Result<PenaltyComponents> {
        self.space.check_len(x)?;
        if self.weights.is_zero() {
            return Ok(PenaltyComponents::default());
        }
        self.run_jobs(x)?;

        let w = &self.weights;
        let mut c = PenaltyComponents::default();
        if w.density != 0.0 {
            c.density = self.density_component()?;
        }
        if w.excited_states != 0.0 {
            c.excited_states = self.excited_state_component()?;
        }
        if w.ground_state != 0.0 {
            c.ground_state = self.ground_state_component()?;
        }
        if w.states != 0.0 {
            c.states = self.all_state_component()?;
        }
        Ok(c)
    }

    /// Write job inputs at `x` without evaluating.
    ///
    /// # Errors
    ///
    /// Propagates collaborator failures.
    pub fn write_job_inputs(&self, x: &[f64], tag: &str) -> Result<()> {
        self.space.check_len(x)?;
        self.evaluator.write_job_inputs(x, tag)
    }

    fn run_jobs(&self, x: &[f64]) -> Result<()> {
        #[cfg(feature = "async")]
        if self.parallel && self.systems.len() > 1 {
            return self.run_jobs_parallel(x);
        }
        #[cfg(not(feature = "async"))]
        if self.parallel {
            trace_debug!("parallel jobs need the `async` feature; running serially");
        }

        for system in &self.systems {
            self.evaluator.run_job(x, system)?;
        }
        Ok(())
    }

    /// Run every system's job on the blocking pool and wait for all of them.
    #[cfg(feature = "async")]
    fn run_jobs_parallel(&self, x: &[f64]) -> Result<()> {
        use tokio::task::JoinSet;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|e| Error::TaskError(e.to_string()))?;

        runtime.block_on(async {
            let mut join_set: JoinSet<Result<()>> = JoinSet::new();
            for system in &self.systems {
                let evaluator = Arc::clone(&self.evaluator);
                let params = x.to_vec();
                let system = system.clone();
                join_set.spawn_blocking(move || evaluator.run_job(&params, &system));
            }

            // Drain everything before reporting, so no job outlives the call.
            let mut first_error = None;
            while let Some(joined) = join_set.join_next().await {
                let outcome = joined.map_err(|e| Error::TaskError(e.to_string()));
                if let Err(e) = outcome.and_then(|r| r) {
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }

    fn checked(&self, system: &MolecularSystem, energies: Vec<f64>) -> Result<Vec<f64>> {
        let expected = system.n_states.max(1);
        if energies.len() < expected {
            return Err(Error::InsufficientStateData {
                system: system.name.clone(),
                expected,
                got: energies.len(),
            });
        }
        Ok(energies)
    }

    fn energies(&self, system: &MolecularSystem) -> Result<(Vec<f64>, Vec<f64>)> {
        let computed = self.checked(system, self.evaluator.state_energies(system)?)?;
        let reference = self.checked(system, self.evaluator.reference_state_energies(system)?)?;
        Ok((computed, reference))
    }

    fn density_component(&self) -> Result<f64> {
        let mut total = 0.0;
        for system in &self.systems {
            total += self.evaluator.density_error(system)?;
        }
        Ok(total)
    }

    fn ground_state_component(&self) -> Result<f64> {
        let mut total = 0.0;
        for system in &self.systems {
            let (computed, reference) = self.energies(system)?;
            total += rmse(&[computed[0] - reference[0]]);
        }
        Ok(total)
    }

    fn excited_state_component(&self) -> Result<f64> {
        let mut total = 0.0;
        for system in &self.systems {
            if system.n_states < 2 {
                continue;
            }
            let (computed, reference) = self.energies(system)?;
            let diffs: Vec<f64> = (1..system.n_states)
                .map(|i| {
                    let excitation = computed[i] - computed[0];
                    let reference_excitation = reference[i] - reference[0];
                    (excitation - reference_excitation) * HARTREE_TO_WAVENUMBER
                })
                .collect();
            total += rmse(&diffs);
        }
        Ok(total)
    }

    fn all_state_component(&self) -> Result<f64> {
        let mut total = 0.0;
        for system in &self.systems {
            let (computed, reference) = self.energies(system)?;
            let diffs: Vec<f64> = (0..system.n_states.max(1))
                .map(|i| (computed[i] - reference[i]) * HARTREE_TO_WAVENUMBER)
                .collect();
            total += rmse(&diffs);
        }
        Ok(total)
    }
}
