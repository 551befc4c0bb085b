//! The seam between the optimizer and the quantum-chemistry program.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One molecular system the penalty function is evaluated on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MolecularSystem {
    /// Name used for job files (e.g. `"hcn"`).
    pub name: String,
    /// Number of grid points in the density comparison.
    #[serde(default)]
    pub density_points: usize,
    /// Density extraction mode understood by the collaborator
    /// (1 = x, 2 = x + z, 3 = xyz).
    #[serde(default = "default_density_mode")]
    pub density_mode: u8,
    /// Number of states (ground state included) read back per job.
    pub n_states: usize,
}

fn default_density_mode() -> u8 {
    2
}

impl MolecularSystem {
    /// Creates a system with the default density settings.
    #[must_use]
    pub fn new(name: impl Into<String>, n_states: usize) -> Self {
        Self {
            name: name.into(),
            density_points: 0,
            density_mode: default_density_mode(),
            n_states,
        }
    }
}

/// External electronic-structure collaborator.
///
/// The optimizer never looks inside the engine. It asks for a job to be run
/// at a parameter vector and then reads back one raw quantity at a time.
/// The production implementation is
/// [`ShellEvaluator`](super::ShellEvaluator); tests plug in deterministic
/// stubs.
///
/// Implementations must be `Send + Sync` because independent systems may be
/// run concurrently (feature `async`). Calls for *different* systems may
/// overlap; calls for the same system never do.
///
/// # Examples
///
/// ```
/// use basis_optimizer::objective::{ExternalEvaluator, MolecularSystem};
/// use basis_optimizer::Result;
/// use parking_lot::Mutex;
///
/// /// Pretends the density error is the squared norm of the parameters.
/// struct Sphere(Mutex<Vec<f64>>);
///
/// impl ExternalEvaluator for Sphere {
///     fn run_job(&self, parameters: &[f64], _system: &MolecularSystem) -> Result<()> {
///         *self.0.lock() = parameters.to_vec();
///         Ok(())
///     }
///     fn density_error(&self, _system: &MolecularSystem) -> Result<f64> {
///         Ok(self.0.lock().iter().map(|x| x * x).sum())
///     }
///     fn state_energies(&self, _system: &MolecularSystem) -> Result<Vec<f64>> {
///         Ok(vec![0.0])
///     }
///     fn reference_state_energies(&self, _system: &MolecularSystem) -> Result<Vec<f64>> {
///         Ok(vec![0.0])
///     }
///     fn write_job_inputs(&self, _parameters: &[f64], _tag: &str) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait ExternalEvaluator: Send + Sync {
    /// Run one job for `system` at `parameters`, leaving its artifacts
    /// available to the extraction methods below.
    ///
    /// # Errors
    ///
    /// [`Error::ExternalJob`](crate::Error::ExternalJob) if the job fails.
    fn run_job(&self, parameters: &[f64], system: &MolecularSystem) -> Result<()>;

    /// Density-fit error of the last job for `system` against its reference.
    ///
    /// # Errors
    ///
    /// Fails when the density artifact is missing or unreadable.
    fn density_error(&self, system: &MolecularSystem) -> Result<f64>;

    /// State energies (hartree) of the last job, ground state first.
    ///
    /// # Errors
    ///
    /// [`Error::MissingEnergyData`](crate::Error::MissingEnergyData) when the
    /// job left no energies behind.
    fn state_energies(&self, system: &MolecularSystem) -> Result<Vec<f64>>;

    /// Reference state energies (hartree) for `system`, ground state first.
    ///
    /// # Errors
    ///
    /// [`Error::MissingEnergyData`](crate::Error::MissingEnergyData) when the
    /// reference data is absent.
    fn reference_state_energies(&self, system: &MolecularSystem) -> Result<Vec<f64>>;

    /// Write job inputs for `parameters` without running anything, so the
    /// operator can submit them as batch jobs. `tag` distinguishes files.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the inputs cannot be written.
    fn write_job_inputs(&self, parameters: &[f64], tag: &str) -> Result<()>;
}
