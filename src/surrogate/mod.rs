//! Gaussian-process regression surrogate of the penalty function.
//!
//! The surrogate is a zero-mean GP with a kernel `c · k(x, x')`, where `k` is
//! one of the stationary shapes in [`KernelKind`]. Fitting works on a fixed
//! snapshot of the training set:
//!
//! 1. Inputs are scaled to the unit cube using the parameter bounds.
//! 2. Targets are standardized to zero mean and unit variance when
//!    `normalize_y` is set.
//! 3. The kernel hyperparameters maximize the log marginal likelihood. The
//!    search runs in log space with a bounded Nelder–Mead, once from unit
//!    values and once from each of `n_restarts` random starts.
//! 4. `K + σ²I` is Cholesky-factored. If the factorization fails, the
//!    diagonal jitter is raised step by step before giving up with
//!    [`Error::SurrogateFit`].
//!
//! A fitted [`GaussianProcess`] is never updated in place. Refit after every
//! dataset change.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `kernel` | `matern52` | Kernel shape |
//! | `n_restarts` | 12 | Random restarts of the likelihood search |
//! | `normalize_y` | `true` | Standardize targets before fitting |
//! | `noise_variance` | 1e-10 | Observation noise on the diagonal |
//! | `length_scale_bounds` | (1e-5, 1e5) | Bounds of every hyperparameter |
//! | `seed` | random | RNG seed of the restarts |
//!
//! # Examples
//!
//! ```
//! use basis_optimizer::dataset::{Dataset, Sample};
//! use basis_optimizer::parameter::{Bounds, OrbitalType, ParameterSpace};
//! use basis_optimizer::surrogate::{GaussianProcess, KernelKind, SurrogateConfig};
//!
//! let space = ParameterSpace::new(
//!     vec![Bounds::new(0.0, 4.0).unwrap()],
//!     vec![OrbitalType::S],
//! )
//! .unwrap();
//! let data: Dataset = [0.0, 1.0, 2.0, 3.0, 4.0]
//!     .iter()
//!     .map(|&x| Sample::new(vec![x], (x - 2.0) * (x - 2.0)))
//!     .collect();
//!
//! let config = SurrogateConfig::builder()
//!     .kernel(KernelKind::Rbf)
//!     .n_restarts(2)
//!     .seed(7)
//!     .build();
//! let gp = GaussianProcess::fit(&data, &config, &space).unwrap();
//!
//! // Interpolates the training data.
//! let p = gp.predict(&[2.0]).unwrap();
//! assert!(p.mean.abs() < 1e-3);
//! ```

mod kernel;

use nalgebra::{Cholesky, DVector, Dyn};
use serde::{Deserialize, Serialize};

pub use kernel::{Hyperparameters, KernelKind};

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::objective::rmse;
use crate::parameter::ParameterSpace;
use crate::rng_util;
use crate::search::nelder_mead::{self, NelderMead};

/// Default number of random restarts of the likelihood search.
const DEFAULT_N_RESTARTS: usize = 12;
/// Default observation noise variance.
const DEFAULT_NOISE_VAR: f64 = 1e-10;
/// Default hyperparameter bounds.
const DEFAULT_BOUNDS: (f64, f64) = (1e-5, 1e5);
/// Extra diagonal jitter tried, in order, when `K + σ²I` does not factor.
const JITTER_LADDER: [f64; 6] = [0.0, 1e-10, 1e-8, 1e-6, 1e-4, 1e-2];
/// Simplex iterations per hyperparameter in one likelihood search.
const ITERATIONS_PER_HYPERPARAMETER: usize = 100;

/// Surrogate fitting options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurrogateConfig {
    /// Kernel shape.
    pub kernel: KernelKind,
    /// Random restarts of the likelihood search on top of the unit start.
    pub n_restarts: usize,
    /// Standardize the targets before fitting.
    pub normalize_y: bool,
    /// Observation noise variance added to the kernel diagonal.
    pub noise_variance: f64,
    /// Lower and upper bound of the amplitude, the length scales and `α`.
    pub length_scale_bounds: (f64, f64),
    /// Seed of the restart draws.
    pub seed: Option<u64>,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            kernel: KernelKind::default(),
            n_restarts: DEFAULT_N_RESTARTS,
            normalize_y: true,
            noise_variance: DEFAULT_NOISE_VAR,
            length_scale_bounds: DEFAULT_BOUNDS,
            seed: None,
        }
    }
}

impl SurrogateConfig {
    /// Creates a builder for configuring a `SurrogateConfig`.
    #[must_use]
    pub fn builder() -> SurrogateConfigBuilder {
        SurrogateConfigBuilder::new()
    }

    /// Check the bounds and noise for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.length_scale_bounds;
        if lo.is_nan() || lo <= 0.0 || hi.is_nan() || lo > hi || hi.is_infinite() {
            return Err(Error::InvalidConfig(format!(
                "surrogate hyperparameter bounds must satisfy 0 < low <= high, got ({lo}, {hi})"
            )));
        }
        if !self.noise_variance.is_finite() || self.noise_variance < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "surrogate noise variance must be finite and non-negative, got {}",
                self.noise_variance
            )));
        }
        Ok(())
    }
}

/// Builder for configuring a [`SurrogateConfig`].
///
/// ```
/// use basis_optimizer::surrogate::{KernelKind, SurrogateConfigBuilder};
///
/// let config = SurrogateConfigBuilder::new()
///     .kernel(KernelKind::RationalQuadratic)
///     .n_restarts(4)
///     .noise_variance(1e-8)
///     .build();
/// assert!(config.normalize_y);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SurrogateConfigBuilder {
    kernel: Option<KernelKind>,
    n_restarts: Option<usize>,
    normalize_y: Option<bool>,
    noise_variance: Option<f64>,
    length_scale_bounds: Option<(f64, f64)>,
    seed: Option<u64>,
}

impl SurrogateConfigBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the kernel shape.
    ///
    /// Default: [`KernelKind::Matern52`].
    #[must_use]
    pub fn kernel(mut self, kernel: KernelKind) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// Sets the number of random restarts of the likelihood search.
    ///
    /// Default: 12.
    #[must_use]
    pub fn n_restarts(mut self, n: usize) -> Self {
        self.n_restarts = Some(n);
        self
    }

    /// Sets whether targets are standardized.
    ///
    /// Default: `true`.
    #[must_use]
    pub fn normalize_y(mut self, normalize: bool) -> Self {
        self.normalize_y = Some(normalize);
        self
    }

    /// Sets the observation noise variance added to the kernel diagonal.
    ///
    /// Default: 1e-10.
    #[must_use]
    pub fn noise_variance(mut self, v: f64) -> Self {
        self.noise_variance = Some(v);
        self
    }

    /// Sets the bounds shared by every hyperparameter.
    ///
    /// Default: `(1e-5, 1e5)`.
    #[must_use]
    pub fn length_scale_bounds(mut self, low: f64, high: f64) -> Self {
        self.length_scale_bounds = Some((low, high));
        self
    }

    /// Sets the random seed for reproducibility.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the configured [`SurrogateConfig`].
    #[must_use]
    pub fn build(self) -> SurrogateConfig {
        let defaults = SurrogateConfig::default();
        SurrogateConfig {
            kernel: self.kernel.unwrap_or(defaults.kernel),
            n_restarts: self.n_restarts.unwrap_or(defaults.n_restarts),
            normalize_y: self.normalize_y.unwrap_or(defaults.normalize_y),
            noise_variance: self.noise_variance.unwrap_or(defaults.noise_variance),
            length_scale_bounds: self
                .length_scale_bounds
                .unwrap_or(defaults.length_scale_bounds),
            seed: self.seed,
        }
    }
}

/// Posterior mean and standard deviation at one point, in objective units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    /// Posterior mean.
    pub mean: f64,
    /// Posterior standard deviation.
    pub std: f64,
}

/// Diagnostics of one fit, for the operator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Number of samples the model was fitted on.
    pub n_training: usize,
    /// Log marginal likelihood at the fitted hyperparameters.
    pub log_marginal_likelihood: f64,
    /// Fitted hyperparameters.
    pub hyperparameters: Hyperparameters,
    /// RMSE of the predicted mean on the testing set, when one was given.
    pub validation_rmse: Option<f64>,
}

/// A fitted GP model ready for predictions.
pub struct GaussianProcess {
    kind: KernelKind,
    hyperparameters: Hyperparameters,
    space: ParameterSpace,
    /// Training inputs (each row is a data point, normalized to [0, 1]).
    x_train: Vec<Vec<f64>>,
    /// Cholesky factor L of K + σ²I.
    cholesky: Cholesky<f64, Dyn>,
    /// α = (K + σ²I)^{-1} y.
    alpha: DVector<f64>,
    y_mean: f64,
    y_std: f64,
    noise_variance: f64,
    lml: f64,
}

/// One successful factorization of `K + σ²I`.
struct Factored {
    cholesky: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    noise_variance: f64,
    lml: f64,
}

/// Factor `K + σ²I`, escalating the jitter until it succeeds.
#[allow(clippy::cast_precision_loss)]
fn factor(
    kind: KernelKind,
    x: &[Vec<f64>],
    y: &DVector<f64>,
    hp: &Hyperparameters,
    noise_var: f64,
) -> Option<Factored> {
    let n = x.len();
    for jitter in JITTER_LADDER {
        let noise = noise_var + jitter * hp.amplitude;
        let k = kernel::kernel_matrix(kind, x, hp, noise);
        let Some(cholesky) = Cholesky::new(k) else {
            continue;
        };
        let alpha = cholesky.solve(y);

        // log p(y | X, θ) = -½ yᵀα - Σ ln L_ii - n/2 ln 2π
        let log_det: f64 = cholesky.l_dirty().diagonal().iter().map(|d| d.ln()).sum();
        let lml = -0.5 * y.dot(&alpha)
            - log_det
            - 0.5 * n as f64 * core::f64::consts::TAU.ln();
        if !lml.is_finite() {
            continue;
        }
        return Some(Factored {
            cholesky,
            alpha,
            noise_variance: noise,
            lml,
        });
    }
    None
}

impl GaussianProcess {
    /// Fit a GP to `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyDataset`] for an empty dataset,
    /// [`Error::DimensionMismatch`] when a sample does not match `space`, and
    /// [`Error::SurrogateFit`] when the covariance matrix cannot be factored,
    /// and [`Error::LocalSearch`] when the likelihood search fails.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(
        dataset: &Dataset,
        config: &SurrogateConfig,
        space: &ParameterSpace,
    ) -> Result<Self> {
        config.validate()?;
        if dataset.is_empty() {
            return Err(Error::EmptyDataset);
        }
        for sample in dataset {
            space.check_len(&sample.parameters)?;
        }

        let x_train: Vec<Vec<f64>> = dataset
            .iter()
            .map(|s| space.to_unit(&s.parameters))
            .collect();
        let targets = dataset.targets();
        let n = targets.len();

        // Standardize y
        let (y_mean, y_std) = if config.normalize_y {
            let mean = targets.iter().sum::<f64>() / n as f64;
            let var = targets.iter().map(|&y| (y - mean).powi(2)).sum::<f64>() / n as f64;
            let std = var.sqrt();
            (mean, if std > 0.0 { std } else { 1.0 })
        } else {
            (0.0, 1.0)
        };
        let y = DVector::from_iterator(n, targets.iter().map(|&v| (v - y_mean) / y_std));

        let kind = config.kernel;
        let (lo, hi) = config.length_scale_bounds;
        let initial = Hyperparameters::initial(kind, space.len());
        let n_theta = initial.to_log().len();
        let lower = vec![lo.ln(); n_theta];
        let upper = vec![hi.ln(); n_theta];
        let opts = NelderMead {
            max_iter: u64::try_from(ITERATIONS_PER_HYPERPARAMETER * n_theta).unwrap_or(u64::MAX),
            sd_tolerance: 1e-8,
            ..NelderMead::default()
        };

        let neg_lml = |theta: &[f64]| {
            let hp = Hyperparameters::from_log(kind, theta);
            factor(kind, &x_train, &y, &hp, config.noise_variance)
                .map_or(f64::INFINITY, |f| -f.lml)
        };

        let mut rng = config
            .seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        let mut starts = vec![initial.to_log()];
        for _ in 0..config.n_restarts {
            starts.push(
                lower
                    .iter()
                    .zip(&upper)
                    .map(|(&l, &h)| rng_util::f64_range(&mut rng, l, h))
                    .collect(),
            );
        }

        // Strict `<` keeps the earliest start on ties.
        let mut best: Option<nelder_mead::LocalMinimum> = None;
        for start in &starts {
            let local = nelder_mead::minimize(&neg_lml, start, &lower, &upper, &opts)?;
            if best.as_ref().is_none_or(|b| local.value < b.value) {
                best = Some(local);
            }
        }
        let theta = match best {
            Some(b) if b.value.is_finite() => b.x,
            _ => {
                return Err(Error::SurrogateFit(
                    "kernel matrix is not positive definite for any hyperparameters tried".into(),
                ));
            }
        };

        let hyperparameters = Hyperparameters::from_log(kind, &theta);
        let factored = factor(kind, &x_train, &y, &hyperparameters, config.noise_variance)
            .ok_or_else(|| {
                Error::SurrogateFit("kernel matrix is not positive definite".into())
            })?;

        trace_info!(
            n_training = n,
            kernel = %kind,
            log_marginal_likelihood = factored.lml,
            ?hyperparameters,
            "surrogate fitted"
        );

        Ok(Self {
            kind,
            hyperparameters,
            space: space.clone(),
            x_train,
            cholesky: factored.cholesky,
            alpha: factored.alpha,
            y_mean,
            y_std,
            noise_variance: factored.noise_variance,
            lml: factored.lml,
        })
    }

    /// Posterior mean and standard deviation at `x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] for a vector of the wrong length.
    pub fn predict(&self, x: &[f64]) -> Result<Prediction> {
        self.space.check_len(x)?;
        let unit = self.space.to_unit(x);
        let k_star = kernel::kernel_vector(self.kind, &unit, &self.x_train, &self.hyperparameters);

        // Mean: k*^T α
        let mean = k_star.dot(&self.alpha);

        // Variance: k(x*, x*) - k*^T (K + σ²I)^{-1} k*
        let v = self.cholesky.solve(&k_star);
        let var = (self.hyperparameters.amplitude - k_star.dot(&v)).max(0.0);

        Ok(Prediction {
            mean: mean * self.y_std + self.y_mean,
            std: var.sqrt() * self.y_std,
        })
    }

    /// [`predict`](Self::predict) for every point in `xs`.
    ///
    /// # Errors
    ///
    /// Fails on the first vector of the wrong length.
    pub fn predict_batch(&self, xs: &[Vec<f64>]) -> Result<Vec<Prediction>> {
        xs.iter().map(|x| self.predict(x)).collect()
    }

    /// Posterior mean only. Skips the variance solve and the length check;
    /// `x` must have one entry per parameter.
    #[must_use]
    pub fn predict_mean(&self, x: &[f64]) -> f64 {
        let unit = self.space.to_unit(x);
        let mut mean = 0.0;
        for (row, a) in self.x_train.iter().zip(self.alpha.iter()) {
            mean += kernel::covariance(self.kind, &unit, row, &self.hyperparameters) * a;
        }
        mean * self.y_std + self.y_mean
    }

    /// RMSE of the predicted mean against the stored values of `testing`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyDataset`] for an empty testing set.
    pub fn validation_rmse(&self, testing: &Dataset) -> Result<f64> {
        if testing.is_empty() {
            return Err(Error::EmptyDataset);
        }
        let mut diffs = Vec::with_capacity(testing.len());
        for sample in testing {
            diffs.push(self.predict(&sample.parameters)?.mean - sample.value);
        }
        Ok(rmse(&diffs))
    }

    /// Fit diagnostics, including the validation RMSE when `testing` is
    /// given and not empty.
    ///
    /// # Errors
    ///
    /// Propagates [`validation_rmse`](Self::validation_rmse) failures.
    pub fn report(&self, testing: Option<&Dataset>) -> Result<FitReport> {
        let validation_rmse = match testing {
            Some(t) if !t.is_empty() => Some(self.validation_rmse(t)?),
            _ => None,
        };
        Ok(FitReport {
            n_training: self.x_train.len(),
            log_marginal_likelihood: self.lml,
            hyperparameters: self.hyperparameters.clone(),
            validation_rmse,
        })
    }

    /// Log marginal likelihood at the fitted hyperparameters.
    #[must_use]
    pub fn log_marginal_likelihood(&self) -> f64 {
        self.lml
    }

    /// Fitted hyperparameters.
    #[must_use]
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Kernel shape.
    #[must_use]
    pub fn kernel(&self) -> KernelKind {
        self.kind
    }

    /// Diagonal noise that was actually used, jitter included.
    #[must_use]
    pub fn noise_variance(&self) -> f64 {
        self.noise_variance
    }

    /// Number of training samples.
    #[must_use]
    pub fn n_training(&self) -> usize {
        self.x_train.len()
    }

    /// The parameter space the model was fitted in.
    #[must_use]
    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }
}
