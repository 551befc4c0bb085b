//! [`ExternalEvaluator`] backed by an operator-supplied command.

use core::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::{ExternalEvaluator, MolecularSystem};
use crate::error::{Error, Result};
use crate::parameter::{OrbitalType, even_tempered_exponents};
use crate::storage;

/// Line of a basis template replaced by the contracted shell.
pub const CONTRACTED_SHELL_MARKER: &str = "<CONTRACTED SHELL>";

/// Environment variable carrying [`MolecularSystem::density_points`].
pub const DENSITY_POINTS_VAR: &str = "BASIS_OPT_DENSITY_POINTS";
/// Environment variable carrying [`MolecularSystem::density_mode`].
pub const DENSITY_MODE_VAR: &str = "BASIS_OPT_DENSITY_MODE";
/// Environment variable carrying [`MolecularSystem::n_states`].
pub const N_STATES_VAR: &str = "BASIS_OPT_N_STATES";

/// A single contracted shell whose coefficients are optimized while its
/// exponents stay fixed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractionShell {
    /// Angular momentum of the shell.
    pub orbital_type: OrbitalType,
    /// Fixed primitive exponents, one per optimized coefficient.
    pub exponents: Vec<f64>,
    /// Basis template with one [`CONTRACTED_SHELL_MARKER`] line. Relative
    /// paths are resolved against the work directory.
    pub template: PathBuf,
}

/// How to invoke the electronic-structure job wrapper.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Executable to run, resolved through `PATH` when not absolute.
    pub command: String,
    /// Arguments placed before the system name.
    #[serde(default)]
    pub args: Vec<String>,
    /// Functions per shell when the parameters are even-tempered
    /// `(a, b)` pairs. `None` passes exponents through unchanged.
    #[serde(default)]
    pub even_tempered: Option<Vec<usize>>,
    /// Optimize contraction coefficients of this shell instead of
    /// exponents.
    #[serde(default)]
    pub contraction: Option<ContractionShell>,
}

/// Runs `<command> <args...> <system>` inside the work directory.
///
/// Before each job the parameters are written to `<system>.params`, one per
/// line: exponents, after even-tempered expansion when configured, or
/// contraction coefficients. In contraction mode the filled-in basis
/// template is also written to `<system>.basis`. The density settings of
/// the system are passed in [`DENSITY_POINTS_VAR`] and
/// [`DENSITY_MODE_VAR`], and the state count in [`N_STATES_VAR`].
///
/// The wrapper is expected to leave behind:
///
/// - `<system>_dens.rmse`: the density RMSE against the reference,
/// - `<system>_states.data`: computed state energies, ground state first,
/// - `<system>_states.ref.data`: reference state energies.
#[derive(Clone, Debug)]
pub struct ShellEvaluator {
    config: ShellConfig,
    work_dir: PathBuf,
}

impl ShellEvaluator {
    /// Creates an evaluator running jobs inside `work_dir`.
    #[must_use]
    pub fn new(config: ShellConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
        }
    }

    /// The directory jobs run in.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn exponents(&self, parameters: &[f64]) -> Result<Vec<f64>> {
        match &self.config.even_tempered {
            Some(counts) => even_tempered_exponents(parameters, counts),
            None => Ok(parameters.to_vec()),
        }
    }

    fn render_exponents(&self, parameters: &[f64]) -> Result<String> {
        let values = if self.config.contraction.is_some() {
            parameters.to_vec()
        } else {
            self.exponents(parameters)?
        };
        let mut out = String::new();
        for v in values {
            let _ = writeln!(out, " {v:.5}");
        }
        Ok(out)
    }

    /// Fill the basis template with the contracted shell, or `None` outside
    /// contraction mode.
    fn render_basis(&self, coefficients: &[f64]) -> Result<Option<String>> {
        let Some(shell) = &self.config.contraction else {
            return Ok(None);
        };
        if shell.exponents.len() != coefficients.len() {
            return Err(Error::DimensionMismatch {
                expected: shell.exponents.len(),
                got: coefficients.len(),
            });
        }
        let path = self.work_dir.join(&shell.template);
        let template = std::fs::read_to_string(&path)
            .map_err(|e| Error::from_io(e, &path, "contraction basis template"))?;

        let mut out = String::new();
        let mut replaced = false;
        for line in template.lines() {
            if !replaced && line.contains(CONTRACTED_SHELL_MARKER) {
                let _ = writeln!(out, "{}    {}    1.0", shell.orbital_type, coefficients.len());
                for (e, c) in shell.exponents.iter().zip(coefficients) {
                    let _ = writeln!(out, "{e:8.4}{c:10.6}");
                }
                replaced = true;
            } else {
                let _ = writeln!(out, "{line}");
            }
        }
        if !replaced {
            return Err(Error::InvalidConfig(format!(
                "basis template {} has no {CONTRACTED_SHELL_MARKER} line",
                path.display()
            )));
        }
        Ok(Some(out))
    }

    fn write_inputs(
        &self,
        parameters: &[f64],
        params_path: &Path,
        basis_path: &Path,
    ) -> Result<()> {
        storage::atomic_write(params_path, self.render_exponents(parameters)?.as_bytes())?;
        if let Some(basis) = self.render_basis(parameters)? {
            storage::atomic_write(basis_path, basis.as_bytes())?;
        }
        Ok(())
    }

    fn artifact(&self, system: &MolecularSystem, suffix: &str) -> PathBuf {
        self.work_dir.join(format!("{}{suffix}", system.name))
    }

    fn read_energies(&self, system: &MolecularSystem, path: &Path) -> Result<Vec<f64>> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::MissingEnergyData {
                system: system.name.clone(),
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;
        let energies = parse_state_energies(&text).map_err(|reason| Error::ExternalJob {
            system: system.name.clone(),
            reason: format!("{}: {reason}", path.display()),
        })?;
        if energies.is_empty() {
            return Err(Error::MissingEnergyData {
                system: system.name.clone(),
                path: path.to_path_buf(),
            });
        }
        Ok(energies)
    }
}

impl ExternalEvaluator for ShellEvaluator {
    fn run_job(&self, parameters: &[f64], system: &MolecularSystem) -> Result<()> {
        self.write_inputs(
            parameters,
            &self.artifact(system, ".params"),
            &self.artifact(system, ".basis"),
        )?;

        let output = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(&system.name)
            .env(DENSITY_POINTS_VAR, system.density_points.to_string())
            .env(DENSITY_MODE_VAR, system.density_mode.to_string())
            .env(N_STATES_VAR, system.n_states.to_string())
            .current_dir(&self.work_dir)
            .output()
            .map_err(|e| Error::ExternalJob {
                system: system.name.clone(),
                reason: format!("failed to start '{}': {e}", self.config.command),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalJob {
                system: system.name.clone(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        trace_debug!(system = %system.name, "job finished");
        Ok(())
    }

    fn density_error(&self, system: &MolecularSystem) -> Result<f64> {
        let path = self.artifact(system, "_dens.rmse");
        let job_err = |reason: String| Error::ExternalJob {
            system: system.name.clone(),
            reason,
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| job_err(format!("no density output {}: {e}", path.display())))?;
        let field = text
            .split_whitespace()
            .next()
            .ok_or_else(|| job_err(format!("empty density output {}", path.display())))?;
        field
            .parse::<f64>()
            .map_err(|e| job_err(format!("bad density value '{field}': {e}")))
    }

    fn state_energies(&self, system: &MolecularSystem) -> Result<Vec<f64>> {
        self.read_energies(system, &self.artifact(system, "_states.data"))
    }

    fn reference_state_energies(&self, system: &MolecularSystem) -> Result<Vec<f64>> {
        self.read_energies(system, &self.artifact(system, "_states.ref.data"))
    }

    fn write_job_inputs(&self, parameters: &[f64], tag: &str) -> Result<()> {
        self.write_inputs(
            parameters,
            &self.work_dir.join(format!("params.{tag}")),
            &self.work_dir.join(format!("basis.{tag}")),
        )
    }
}

/// Parse an energy listing: the first number on every non-blank,
/// non-comment line.
///
/// # Errors
///
/// Returns a description of the first line that does not start with a
/// number.
pub fn parse_state_energies(text: &str) -> core::result::Result<Vec<f64>, String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            let field = l.split_whitespace().next().unwrap_or(l);
            field
                .parse::<f64>()
                .map_err(|e| format!("'{field}': {e}"))
        })
        .collect()
}
