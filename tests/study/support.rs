//! Shared fixtures: a quadratic stand-in for the chemistry program and
//! fast search settings.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use basis_optimizer::objective::{ExternalEvaluator, MolecularSystem, PenaltyWeights};
use basis_optimizer::parameter::{Bounds, OrbitalType, ParameterSpace};
use basis_optimizer::surrogate::KernelKind;
use basis_optimizer::{Config, Error, Result};
use parking_lot::Mutex;

/// Density error `x0² + x1² + …` of the last job's parameters.
#[derive(Default)]
pub struct Quadratic {
    last: Mutex<Vec<f64>>,
    jobs: AtomicUsize,
    inputs: Mutex<Vec<String>>,
    /// Fail every job after this many succeeded.
    pub fail_after: Option<usize>,
    /// Report missing energy files.
    pub no_energies: bool,
}

impl Quadratic {
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn without_energies() -> Self {
        Self {
            no_energies: true,
            ..Self::default()
        }
    }

    pub fn jobs(&self) -> usize {
        self.jobs.load(Ordering::SeqCst)
    }

    pub fn input_tags(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }
}

impl ExternalEvaluator for Quadratic {
    fn run_job(&self, parameters: &[f64], system: &MolecularSystem) -> Result<()> {
        let done = self.jobs.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|n| done >= n) {
            return Err(Error::ExternalJob {
                system: system.name.clone(),
                reason: "scf did not converge".into(),
            });
        }
        *self.last.lock() = parameters.to_vec();
        Ok(())
    }

    fn density_error(&self, _system: &MolecularSystem) -> Result<f64> {
        Ok(self.last.lock().iter().map(|x| x * x).sum())
    }

    fn state_energies(&self, system: &MolecularSystem) -> Result<Vec<f64>> {
        if self.no_energies {
            return Err(Error::MissingEnergyData {
                system: system.name.clone(),
                path: PathBuf::from(format!("{}_states.data", system.name)),
            });
        }
        Ok(vec![-1.0])
    }

    fn reference_state_energies(&self, _system: &MolecularSystem) -> Result<Vec<f64>> {
        Ok(vec![-1.0])
    }

    fn write_job_inputs(&self, _parameters: &[f64], tag: &str) -> Result<()> {
        self.inputs.lock().push(tag.to_string());
        Ok(())
    }
}

pub fn temp_work_dir() -> PathBuf {
    use std::sync::atomic::AtomicU64;
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    std::env::temp_dir().join(format!(
        "basis_opt_study_test_{}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Two s exponents on `[0.01, 2]`, density-only penalty, small and seeded
/// surrogate and search.
pub fn small_config() -> Config {
    let space = ParameterSpace::new(
        vec![Bounds::new(0.01, 2.0).unwrap(), Bounds::new(0.01, 2.0).unwrap()],
        vec![OrbitalType::S, OrbitalType::P],
    )
    .unwrap();
    let mut config = Config::new(space, vec![MolecularSystem::new("h2", 1)]);
    config.work_dir = temp_work_dir();
    config.weights = PenaltyWeights::density_only();
    config.training.size = 6;
    config.testing.size = 2;
    config.surrogate.kernel = KernelKind::Rbf;
    config.surrogate.n_restarts = 1;
    config.surrogate.seed = Some(3);
    config.search.n_starts = 2;
    config.search.niter = 15;
    config.search.local_max_iter = 80;
    config.search.seed = Some(17);
    config
}

/// A configuration that can never converge: no prediction lies below the
/// sanity ceiling.
pub fn never_converging(max_iterations: usize) -> Config {
    let mut config = small_config();
    config.max_iterations = max_iterations;
    config.tolerance = 1e-9;
    config.sanity_ceiling = -1e6;
    config
}

pub fn cleanup(config: &Config) {
    std::fs::remove_dir_all(&config.work_dir).ok();
}
