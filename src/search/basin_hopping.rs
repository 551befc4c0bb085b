//! Basin hopping: random perturbation, local minimization and a
//! Metropolis acceptance test, repeated `niter` times.

use super::nelder_mead::{self, LocalMinimum, NelderMead};
use crate::error::Result;
use crate::rng_util;

/// Iterations between step-size adjustments.
const ADAPT_INTERVAL: usize = 50;
/// Acceptance rate the step size is steered toward.
const TARGET_ACCEPT_RATE: f64 = 0.5;
/// Multiplicative step-size adjustment.
const STEP_FACTOR: f64 = 0.9;

#[derive(Clone, Copy, Debug)]
pub(crate) struct BasinHopping {
    pub(crate) niter: usize,
    /// Maximum displacement per coordinate, as a fraction of its width.
    pub(crate) step_size: f64,
    pub(crate) temperature: f64,
    pub(crate) local: NelderMead,
}

/// Run basin hopping from `x0` and return the lowest visited minimum that
/// passes `admissible`, or `None` when no minimum did.
///
/// Inadmissible minima still drive the Metropolis walk; they are only
/// never reported.
///
/// # Errors
///
/// Propagates local minimizer failures.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn basin_hopping<F, A>(
    f: &F,
    admissible: A,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    opts: &BasinHopping,
    rng: &mut fastrand::Rng,
) -> Result<Option<LocalMinimum>>
where
    F: Fn(&[f64]) -> f64,
    A: Fn(&LocalMinimum) -> bool,
{
    let mut current = nelder_mead::minimize(f, x0, lower, upper, &opts.local)?;
    let mut best = admissible(&current).then(|| current.clone());
    let mut step = opts.step_size;
    let mut accepted = 0usize;

    for iter in 1..=opts.niter {
        let trial: Vec<f64> = current
            .x
            .iter()
            .zip(lower.iter().zip(upper))
            .map(|(&x, (&lo, &hi))| {
                let width = hi - lo;
                (x + rng_util::f64_range(rng, -step, step) * width).clamp(lo, hi)
            })
            .collect();
        let candidate = nelder_mead::minimize(f, &trial, lower, upper, &opts.local)?;

        let accept = candidate.value < current.value || {
            let delta = candidate.value - current.value;
            opts.temperature > 0.0
                && delta.is_finite()
                && rng.f64() < (-delta / opts.temperature).exp()
        };
        if best.as_ref().is_none_or(|b| candidate.value < b.value) && admissible(&candidate) {
            best = Some(candidate.clone());
        }
        if accept {
            current = candidate;
            accepted += 1;
        }

        if iter % ADAPT_INTERVAL == 0 {
            let rate = accepted as f64 / iter as f64;
            if rate > TARGET_ACCEPT_RATE {
                step /= STEP_FACTOR;
            } else {
                step *= STEP_FACTOR;
            }
        }
    }

    trace_debug!(
        niter = opts.niter,
        accepted,
        best = best.as_ref().map(|b| b.value),
        "basin hopping finished"
    );
    Ok(best)
}
