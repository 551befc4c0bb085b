#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]
#![allow(clippy::similar_names, clippy::many_single_char_names)]

//! Gaussian-process surrogate optimization of basis-set exponents.
//!
//! Every evaluation of the penalty function runs an external
//! electronic-structure job per molecular system, so evaluations are
//! expensive. This crate keeps their number small. It fits a GP to the
//! samples seen so far, finds the GP's predicted minimum with multi-start
//! basin hopping, evaluates the true penalty only there, and repeats until
//! prediction and truth agree.
//!
//! # Getting Started
//!
//! ```
//! use basis_optimizer::prelude::*;
//! use parking_lot::Mutex;
//!
//! /// Stand-in for the chemistry program: density error = |x|².
//! struct Sphere(Mutex<Vec<f64>>);
//!
//! impl ExternalEvaluator for Sphere {
//!     fn run_job(&self, x: &[f64], _: &MolecularSystem) -> Result<()> {
//!         *self.0.lock() = x.to_vec();
//!         Ok(())
//!     }
//!     fn density_error(&self, _: &MolecularSystem) -> Result<f64> {
//!         Ok(self.0.lock().iter().map(|v| v * v).sum())
//!     }
//!     fn state_energies(&self, _: &MolecularSystem) -> Result<Vec<f64>> {
//!         Ok(vec![0.0])
//!     }
//!     fn reference_state_energies(&self, _: &MolecularSystem) -> Result<Vec<f64>> {
//!         Ok(vec![0.0])
//!     }
//!     fn write_job_inputs(&self, _: &[f64], _: &str) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let space = ParameterSpace::new(
//!     vec![Bounds::new(0.01, 2.0)?, Bounds::new(0.01, 2.0)?],
//!     vec![OrbitalType::S, OrbitalType::P],
//! )?;
//! let mut config = Config::new(space, vec![MolecularSystem::new("h2", 1)]);
//! config.weights = PenaltyWeights::density_only();
//! config.training.size = 8;
//! config.search.niter = 10;
//! config.search.seed = Some(1);
//! config.surrogate.n_restarts = 2;
//! config.surrogate.seed = Some(1);
//! config.work_dir = std::env::temp_dir().join(format!("basis_opt_doc_{}", std::process::id()));
//!
//! let mut study = Study::new(config, Sphere(Mutex::new(Vec::new())))?;
//! match study.run()? {
//!     Outcome::Converged { parameters, value, .. } => println!("{parameters:?} -> {value}"),
//!     other => println!("{other:?}"),
//! }
//! # std::fs::remove_dir_all(study.config().work_dir.clone()).ok();
//! # Ok::<(), basis_optimizer::Error>(())
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`ParameterSpace`](parameter::ParameterSpace) | Bounds and orbital types of the optimized exponents. |
//! | [`Dataset`](dataset::Dataset) | Evaluated `(parameters, penalty)` samples, persisted as fixed-width tables. |
//! | [`CompositeObjective`](objective::CompositeObjective) | Weighted penalty over density and state-energy errors. |
//! | [`ExternalEvaluator`](objective::ExternalEvaluator) | The seam to the chemistry program. |
//! | [`GaussianProcess`](surrogate::GaussianProcess) | Surrogate of the penalty. |
//! | [`GlobalSearch`](search::GlobalSearch) | Multi-start basin hopping over the surrogate mean. |
//! | [`Study`] | The loop controller and its persisted state. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key optimization points | on |
//! | `async` | Concurrent molecule jobs within one evaluation via tokio | off |
//! | `cli` | The `basis-opt` binary | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

mod config;
pub mod dataset;
mod error;
pub mod objective;
pub mod parameter;
mod rng_util;
pub mod search;
pub mod storage;
mod study;
pub mod surrogate;
mod types;

pub use config::{Config, STATE_FILE_NAME};
pub use error::{Error, Result};
pub use study::{ObjectiveCheck, OptimizationState, Outcome, Phase, Study, StudyBuilder};
pub use types::{DatasetRole, JobType};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use basis_optimizer::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::dataset::{Dataset, DatasetConfig, Sample};
    pub use crate::error::{Error, Result};
    pub use crate::objective::{
        CompositeObjective, ExternalEvaluator, LinearIndependenceConfig, MolecularSystem,
        PenaltyWeights, ShellConfig, ShellEvaluator,
    };
    pub use crate::parameter::{Bounds, OrbitalType, ParameterSpace};
    pub use crate::search::{Candidate, GlobalSearch, SearchConfig};
    pub use crate::study::{Outcome, Study, StudyBuilder};
    pub use crate::surrogate::{GaussianProcess, KernelKind, Prediction, SurrogateConfig};
    pub use crate::types::{DatasetRole, JobType};
}
