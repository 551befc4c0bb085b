//! Bounded Nelder–Mead simplex minimizer on top of `argmin`.
//!
//! Box constraints are handled by clamping every trial point into the
//! bounds before the cost is evaluated, so the returned point is always
//! feasible.

use argmin::core::{CostFunction, Executor};
use argmin::solver::neldermead::NelderMead as Simplex;

use crate::error::{Error, Result};

/// Cost reported for non-finite objective values. Finite, so the simplex
/// standard deviation stays defined.
const NON_FINITE_COST: f64 = f64::MAX / 4.0;

/// Stopping and shape settings for [`minimize`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct NelderMead {
    /// Maximum number of simplex iterations.
    pub(crate) max_iter: u64,
    /// Stop when the standard deviation of the vertex costs falls below this.
    pub(crate) sd_tolerance: f64,
    /// Initial simplex edge, relative to each dimension's width.
    pub(crate) initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iter: 200,
            sd_tolerance: 1e-10,
            initial_step: 0.05,
        }
    }
}

/// Result of one local minimization.
#[derive(Clone, Debug)]
pub(crate) struct LocalMinimum {
    pub(crate) x: Vec<f64>,
    /// Objective at `x`; `+inf` when it was not finite.
    pub(crate) value: f64,
}

fn clamped(x: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lo, &hi))| v.clamp(lo, hi))
        .collect()
}

/// An objective restricted to a box.
struct BoundedCost<'a, F> {
    f: &'a F,
    lower: &'a [f64],
    upper: &'a [f64],
}

impl<F> CostFunction for BoundedCost<'_, F>
where
    F: Fn(&[f64]) -> f64,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> core::result::Result<Self::Output, argmin::core::Error> {
        let v = (self.f)(&clamped(x, self.lower, self.upper));
        Ok(if v.is_finite() { v } else { NON_FINITE_COST })
    }
}

/// Build the starting simplex around `x0`: `x0` plus one vertex per
/// dimension, stepped toward the interior when `x0` sits on the upper bound.
fn create_initial_simplex(
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    initial_step: f64,
) -> Vec<Vec<f64>> {
    let n = x0.len();
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for i in 0..n {
        let mut vertex = x0.to_vec();
        let width = upper[i] - lower[i];
        let step = if width > 0.0 {
            initial_step * width
        } else {
            initial_step * x0[i].abs().max(1.0)
        };
        vertex[i] = if vertex[i] + step <= upper[i] {
            vertex[i] + step
        } else {
            vertex[i] - step
        };
        simplex.push(clamped(&vertex, lower, upper));
    }
    simplex
}

/// Minimize `f` inside `[lower, upper]` starting from `x0`.
///
/// # Errors
///
/// Returns [`Error::LocalSearch`] when the solver cannot be set up or run.
pub(crate) fn minimize<F>(
    f: &F,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    opts: &NelderMead,
) -> Result<LocalMinimum>
where
    F: Fn(&[f64]) -> f64,
{
    let start = clamped(x0, lower, upper);
    let problem = BoundedCost { f, lower, upper };

    if start.is_empty() {
        let value = f(&start);
        return Ok(LocalMinimum {
            x: start,
            value: if value.is_finite() { value } else { f64::INFINITY },
        });
    }

    let simplex = create_initial_simplex(&start, lower, upper, opts.initial_step);
    let solver: Simplex<Vec<f64>, f64> = Simplex::new(simplex)
        .with_sd_tolerance(opts.sd_tolerance)
        .map_err(|e| Error::LocalSearch(e.to_string()))?;
    let max_iter = opts.max_iter;

    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(max_iter))
        .run()
        .map_err(|e| Error::LocalSearch(e.to_string()))?;

    let best = res
        .state
        .best_param
        .ok_or_else(|| Error::LocalSearch("solver returned no parameters".into()))?;
    let cost = res.state.best_cost;
    Ok(LocalMinimum {
        x: clamped(&best, lower, upper),
        value: if cost < NON_FINITE_COST { cost } else { f64::INFINITY },
    })
}
