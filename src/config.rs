//! Run configuration, loaded from a JSON file.
//!
//! Every knob of a run lives in one [`Config`] value that is passed into the
//! [`Study`](crate::Study). Only `parameters` and `systems` are required;
//! everything else falls back to the documented defaults.
//!
//! ```
//! use basis_optimizer::Config;
//!
//! let config: Config = serde_json::from_str(
//!     r#"{
//!         "parameters": {
//!             "bounds": [[0.01, 20.0], [0.01, 50.0]],
//!             "orbital_types": ["S", "S"]
//!         },
//!         "systems": [{ "name": "hcn", "density_points": 64, "n_states": 1 }],
//!         "weights": { "density": 10.0, "excited_states": 1.0, "ground_state": 1.0 }
//!     }"#,
//! )
//! .unwrap();
//!
//! config.validate().unwrap();
//! assert_eq!(config.max_iterations, 10);
//! assert_eq!(config.training.seed, 100_001);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetConfig;
use crate::error::{Error, Result};
use crate::objective::{
    LinearIndependenceConfig, MolecularSystem, PenaltyWeights, ShellConfig, ShellEvaluator,
};
use crate::parameter::ParameterSpace;
use crate::search::SearchConfig;
use crate::surrogate::SurrogateConfig;
use crate::types::{DatasetRole, JobType};

/// Name of the persisted loop state inside the work directory.
pub const STATE_FILE_NAME: &str = "state.json";

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_iterations() -> usize {
    10
}

fn default_tolerance() -> f64 {
    1.0
}

fn default_sanity_ceiling() -> f64 {
    100.0
}

fn default_duplicate_tolerance() -> f64 {
    1e-3
}

fn default_true() -> bool {
    true
}

/// Complete configuration of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// What this invocation does.
    #[serde(default)]
    pub job_type: JobType,
    /// Directory holding the tables, the state file and the job artifacts.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Bounds and orbital types of the optimized parameters.
    pub parameters: ParameterSpace,
    /// Molecular systems the penalty is evaluated on.
    pub systems: Vec<MolecularSystem>,
    /// Weights of the penalty components.
    #[serde(default)]
    pub weights: PenaltyWeights,
    /// Training set size, seed and file.
    #[serde(default = "DatasetConfig::training")]
    pub training: DatasetConfig,
    /// Testing set size, seed and file.
    #[serde(default = "DatasetConfig::testing")]
    pub testing: DatasetConfig,
    /// Surrogate options.
    #[serde(default)]
    pub surrogate: SurrogateConfig,
    /// Global search options.
    #[serde(default)]
    pub search: SearchConfig,
    /// Maximum number of augment rounds.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Convergence threshold on `|predicted - true|`.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// A prediction at or above this value never counts as converged.
    #[serde(default = "default_sanity_ceiling")]
    pub sanity_ceiling: f64,
    /// Linear-independence guard.
    #[serde(default)]
    pub linear_independence: LinearIndependenceConfig,
    /// Samples closer than this are duplicates when preparing a fit.
    #[serde(default = "default_duplicate_tolerance")]
    pub duplicate_tolerance: f64,
    /// Append every new sample to the testing set as well.
    #[serde(default)]
    pub mirror_into_testing: bool,
    /// Evaluate the bootstrapped training points. When unset, only their
    /// job inputs are written.
    #[serde(default = "default_true")]
    pub evaluate_training_set: bool,
    /// Evaluate the search candidate. When unset, only its job inputs are
    /// written and the run stops.
    #[serde(default = "default_true")]
    pub evaluate_candidate: bool,
    /// Re-evaluate one random training point before the loop starts.
    #[serde(default)]
    pub check_objective: bool,
    /// Run the jobs of different systems concurrently.
    #[serde(default)]
    pub parallel_jobs: bool,
    /// External command used by [`ShellEvaluator`].
    #[serde(default)]
    pub shell: Option<ShellConfig>,
}

impl Config {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new(parameters: ParameterSpace, systems: Vec<MolecularSystem>) -> Self {
        Self {
            job_type: JobType::default(),
            work_dir: default_work_dir(),
            parameters,
            systems,
            weights: PenaltyWeights::default(),
            training: DatasetConfig::training(),
            testing: DatasetConfig::testing(),
            surrogate: SurrogateConfig::default(),
            search: SearchConfig::default(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            sanity_ceiling: default_sanity_ceiling(),
            linear_independence: LinearIndependenceConfig::default(),
            duplicate_tolerance: default_duplicate_tolerance(),
            mirror_into_testing: false,
            evaluate_training_set: true,
            evaluate_candidate: true,
            check_objective: false,
            parallel_jobs: false,
            shell: None,
        }
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingFile`] when the file is absent and
    /// [`Error::InvalidConfig`] when it cannot be parsed or fails
    /// [`validate`](Self::validate).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::from_io(e, path, "loading the configuration"))?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        self.weights.validate()?;
        self.surrogate.validate()?;
        self.search.validate()?;

        if self.systems.is_empty() {
            return invalid("at least one molecular system is required".into());
        }
        if self.training.seed == self.testing.seed {
            return invalid(format!(
                "training and testing seeds must differ, both are {}",
                self.training.seed
            ));
        }
        if self.training.file == self.testing.file {
            return invalid("training and testing tables must be different files".into());
        }
        if self.training.size == 0 {
            return invalid("the training set needs at least one point".into());
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".into());
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return invalid(format!("tolerance must be positive, got {}", self.tolerance));
        }
        if self.duplicate_tolerance.is_nan() || self.duplicate_tolerance < 0.0 {
            return invalid(format!(
                "duplicate_tolerance must be non-negative, got {}",
                self.duplicate_tolerance
            ));
        }
        if let Some(shell) = &self.shell
            && shell.even_tempered.is_some()
            && shell.contraction.is_some()
        {
            return invalid("even_tempered and contraction cannot be combined".into());
        }
        if let Some(shell) = self.shell.as_ref().and_then(|s| s.contraction.as_ref())
            && shell.exponents.len() != self.parameters.len()
        {
            return invalid(format!(
                "contracted shell has {} exponents but {} coefficients are optimized",
                shell.exponents.len(),
                self.parameters.len()
            ));
        }
        if let Some(counts) = self.shell.as_ref().and_then(|s| s.even_tempered.as_ref())
            && counts.len() * 2 != self.parameters.len()
        {
            return invalid(format!(
                "even-tempered basis with {} shells needs {} parameters, got {}",
                counts.len(),
                counts.len() * 2,
                self.parameters.len()
            ));
        }
        Ok(())
    }

    /// Number of optimized parameters.
    #[must_use]
    pub fn n_params(&self) -> usize {
        self.parameters.len()
    }

    /// Size, seed and file of the dataset playing `role`.
    #[must_use]
    pub fn dataset(&self, role: DatasetRole) -> &DatasetConfig {
        match role {
            DatasetRole::Training => &self.training,
            DatasetRole::Testing => &self.testing,
        }
    }

    /// Absolute location of the table for `role`.
    #[must_use]
    pub fn dataset_path(&self, role: DatasetRole) -> PathBuf {
        self.work_dir.join(&self.dataset(role).file)
    }

    /// Location of the persisted loop state.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.work_dir.join(STATE_FILE_NAME)
    }

    /// Build the shell-backed evaluator described by `shell`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when no `shell` section is present.
    pub fn shell_evaluator(&self) -> Result<ShellEvaluator> {
        let shell = self.shell.clone().ok_or_else(|| {
            Error::InvalidConfig("a 'shell' section is required to run external jobs".into())
        })?;
        Ok(ShellEvaluator::new(shell, self.work_dir.clone()))
    }
}
