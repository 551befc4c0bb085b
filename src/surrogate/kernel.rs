//! Stationary covariance functions and their hyperparameters.

use core::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Precomputed √5 constant.
const SQRT_5: f64 = 2.236_067_977_499_79;

/// Shape of the stationary kernel, always scaled by a constant amplitude.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    /// Matérn ν = 5/2 with one length scale per dimension.
    #[default]
    Matern52,
    /// Squared exponential with one length scale per dimension.
    Rbf,
    /// Rational quadratic with a single length scale and a shape `α`.
    RationalQuadratic,
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matern52 => f.write_str("matern52"),
            Self::Rbf => f.write_str("rbf"),
            Self::RationalQuadratic => f.write_str("rational_quadratic"),
        }
    }
}

/// Initial shape parameter of the rational-quadratic kernel.
pub(super) const RQ_ALPHA_INIT: f64 = 0.1;

/// Fitted kernel hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Constant amplitude (signal variance) `c`.
    pub amplitude: f64,
    /// Length scales: one per dimension, or a single one for the
    /// rational-quadratic kernel.
    pub length_scales: Vec<f64>,
    /// Rational-quadratic shape `α`; `None` for the other kernels.
    pub alpha: Option<f64>,
}

impl Hyperparameters {
    /// The starting point of the likelihood optimization: unit amplitude
    /// and unit length scales.
    pub(super) fn initial(kind: KernelKind, dims: usize) -> Self {
        match kind {
            KernelKind::Matern52 | KernelKind::Rbf => Self {
                amplitude: 1.0,
                length_scales: vec![1.0; dims],
                alpha: None,
            },
            KernelKind::RationalQuadratic => Self {
                amplitude: 1.0,
                length_scales: vec![1.0],
                alpha: Some(RQ_ALPHA_INIT),
            },
        }
    }

    /// Natural-log vector `[ln c, ln l.., (ln α)]` searched by the optimizer.
    pub(super) fn to_log(&self) -> Vec<f64> {
        let mut theta = Vec::with_capacity(self.length_scales.len() + 2);
        theta.push(self.amplitude.ln());
        theta.extend(self.length_scales.iter().map(|l| l.ln()));
        if let Some(a) = self.alpha {
            theta.push(a.ln());
        }
        theta
    }

    /// Inverse of [`to_log`](Self::to_log) for a kernel of the given shape.
    pub(super) fn from_log(kind: KernelKind, theta: &[f64]) -> Self {
        let amplitude = theta[0].exp();
        match kind {
            KernelKind::Matern52 | KernelKind::Rbf => Self {
                amplitude,
                length_scales: theta[1..].iter().map(|t| t.exp()).collect(),
                alpha: None,
            },
            KernelKind::RationalQuadratic => Self {
                amplitude,
                length_scales: vec![theta[1].exp()],
                alpha: Some(theta[2].exp()),
            },
        }
    }

    fn length_scale(&self, i: usize) -> f64 {
        if self.length_scales.len() == 1 {
            self.length_scales[0]
        } else {
            self.length_scales[i]
        }
    }
}

/// Scaled squared distance `Σ ((a_i - b_i) / l_i)²`.
fn scaled_sq_dist(a: &[f64], b: &[f64], hp: &Hyperparameters) -> f64 {
    a.iter()
        .zip(b)
        .enumerate()
        .map(|(i, (x, y))| {
            let d = (x - y) / hp.length_scale(i);
            d * d
        })
        .sum()
}

/// Covariance between two points.
///
/// - Matérn 5/2: `c (1 + √5 r + 5/3 r²) exp(-√5 r)`
/// - RBF: `c exp(-r² / 2)`
/// - RQ: `c (1 + r² / (2α))^(-α)`
pub(super) fn covariance(kind: KernelKind, a: &[f64], b: &[f64], hp: &Hyperparameters) -> f64 {
    let r_sq = scaled_sq_dist(a, b, hp);
    let shape = match kind {
        KernelKind::Matern52 => {
            let sqrt5_r = SQRT_5 * r_sq.sqrt();
            (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
        }
        KernelKind::Rbf => (-0.5 * r_sq).exp(),
        KernelKind::RationalQuadratic => {
            let alpha = hp.alpha.unwrap_or(RQ_ALPHA_INIT);
            (1.0 + r_sq / (2.0 * alpha)).powf(-alpha)
        }
    };
    hp.amplitude * shape
}

/// Build the kernel matrix `K + σ²I`.
pub(super) fn kernel_matrix(
    kind: KernelKind,
    x: &[Vec<f64>],
    hp: &Hyperparameters,
    noise_var: f64,
) -> DMatrix<f64> {
    let n = x.len();
    let mut k = DMatrix::zeros(n, n);
    for i in 0..n {
        k[(i, i)] = hp.amplitude + noise_var;
        for j in 0..i {
            let v = covariance(kind, &x[i], &x[j], hp);
            k[(i, j)] = v;
            k[(j, i)] = v;
        }
    }
    k
}

/// Compute the kernel vector k(x*, X) for a test point.
pub(super) fn kernel_vector(
    kind: KernelKind,
    x_star: &[f64],
    x_train: &[Vec<f64>],
    hp: &Hyperparameters,
) -> DVector<f64> {
    DVector::from_fn(x_train.len(), |i, _| {
        covariance(kind, x_star, &x_train[i], hp)
    })
}
