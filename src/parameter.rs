//! Parameter space: per-dimension bounds and orbital types.
//!
//! Every optimized quantity is a basis-function exponent (or an
//! even-tempered `(a, b)` pair) living in a closed interval. Adjacent
//! dimensions that share an [`OrbitalType`] form a *group*; exponents inside
//! a group must stay apart or the generated basis becomes numerically
//! linearly dependent.
//!
//! ```
//! use basis_optimizer::parameter::{Bounds, OrbitalType, ParameterSpace};
//!
//! let space = ParameterSpace::new(
//!     vec![Bounds::new(0.01, 20.0).unwrap(), Bounds::new(0.01, 50.0).unwrap()],
//!     vec![OrbitalType::S, OrbitalType::S],
//! )
//! .unwrap();
//!
//! assert_eq!(space.groups(), vec![0..2]);
//! assert!(space.is_linearly_dependent(&[1.0, 1.2], 0.5));
//! assert!(!space.is_linearly_dependent(&[1.0, 3.0], 0.5));
//! ```

use core::fmt;
use core::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A closed interval `[low, high]` for one parameter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct Bounds {
    low: f64,
    high: f64,
}

impl Bounds {
    /// Creates validated bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if `low > high` or either end is
    /// not finite.
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() || low > high {
            return Err(Error::InvalidBounds { low, high });
        }
        Ok(Self { low, high })
    }

    /// The lower bound.
    #[must_use]
    pub fn low(&self) -> f64 {
        self.low
    }

    /// The upper bound.
    #[must_use]
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Width of the interval.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    /// Whether `value` lies inside the closed interval.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.low..=self.high).contains(&value)
    }

    /// Clamp `value` into the interval.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.low, self.high)
    }

    /// Map `value` to `[0, 1]`. Degenerate intervals map to 0.5.
    #[must_use]
    pub fn to_unit(&self, value: f64) -> f64 {
        if self.width().abs() < 1e-15 {
            0.5
        } else {
            (value - self.low) / self.width()
        }
    }

    /// Map a `[0, 1]` coordinate back into the interval.
    #[must_use]
    pub fn from_unit(&self, unit: f64) -> f64 {
        self.low + unit * self.width()
    }
}

impl TryFrom<(f64, f64)> for Bounds {
    type Error = Error;

    fn try_from((low, high): (f64, f64)) -> Result<Self> {
        Self::new(low, high)
    }
}

impl From<Bounds> for (f64, f64) {
    fn from(b: Bounds) -> Self {
        (b.low, b.high)
    }
}

/// Angular-momentum type of a basis function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrbitalType {
    S,
    P,
    D,
    F,
    G,
    H,
}

impl fmt::Display for OrbitalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::S => "S",
            Self::P => "P",
            Self::D => "D",
            Self::F => "F",
            Self::G => "G",
            Self::H => "H",
        };
        f.write_str(s)
    }
}

/// Bounds and orbital types for every optimized parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterSpaceDef", into = "ParameterSpaceDef")]
pub struct ParameterSpace {
    bounds: Vec<Bounds>,
    orbital_types: Vec<OrbitalType>,
}

/// Unvalidated wire form of [`ParameterSpace`].
#[derive(Serialize, Deserialize)]
struct ParameterSpaceDef {
    bounds: Vec<Bounds>,
    orbital_types: Vec<OrbitalType>,
}

impl TryFrom<ParameterSpaceDef> for ParameterSpace {
    type Error = Error;

    fn try_from(def: ParameterSpaceDef) -> Result<Self> {
        Self::new(def.bounds, def.orbital_types)
    }
}

impl From<ParameterSpace> for ParameterSpaceDef {
    fn from(space: ParameterSpace) -> Self {
        Self {
            bounds: space.bounds,
            orbital_types: space.orbital_types,
        }
    }
}

impl ParameterSpace {
    /// Creates a parameter space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] when the two lists differ in
    /// length, and [`Error::InvalidConfig`] when they are empty.
    pub fn new(bounds: Vec<Bounds>, orbital_types: Vec<OrbitalType>) -> Result<Self> {
        if bounds.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one parameter is required".to_string(),
            ));
        }
        if bounds.len() != orbital_types.len() {
            return Err(Error::DimensionMismatch {
                expected: bounds.len(),
                got: orbital_types.len(),
            });
        }
        Ok(Self {
            bounds,
            orbital_types,
        })
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    /// Always false for a validated space.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Per-dimension bounds.
    #[must_use]
    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    /// Per-dimension orbital types.
    #[must_use]
    pub fn orbital_types(&self) -> &[OrbitalType] {
        &self.orbital_types
    }

    /// Check that `x` has the right length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] otherwise.
    pub fn check_len(&self, x: &[f64]) -> Result<()> {
        if x.len() == self.len() {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.len(),
                got: x.len(),
            })
        }
    }

    /// Whether every component of `x` lies inside its bounds.
    #[must_use]
    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.len() && x.iter().zip(&self.bounds).all(|(v, b)| b.contains(*v))
    }

    /// Clamp every component of `x` into its bounds.
    #[must_use]
    pub fn clamp(&self, x: &[f64]) -> Vec<f64> {
        x.iter().zip(&self.bounds).map(|(v, b)| b.clamp(*v)).collect()
    }

    /// Scale `x` into the unit cube.
    #[must_use]
    pub fn to_unit(&self, x: &[f64]) -> Vec<f64> {
        x.iter().zip(&self.bounds).map(|(v, b)| b.to_unit(*v)).collect()
    }

    /// Map a unit-cube point back into parameter space.
    #[must_use]
    pub fn from_unit(&self, u: &[f64]) -> Vec<f64> {
        u.iter().zip(&self.bounds).map(|(v, b)| b.from_unit(*v)).collect()
    }

    /// Contiguous runs of parameters sharing an orbital type.
    #[must_use]
    pub fn groups(&self) -> Vec<Range<usize>> {
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..=self.orbital_types.len() {
            if i == self.orbital_types.len() || self.orbital_types[i] != self.orbital_types[start] {
                groups.push(start..i);
                start = i;
            }
        }
        groups
    }

    /// Whether two exponents in the same group are closer than `tolerance`.
    ///
    /// Each group is compared after sorting, so the result does not depend
    /// on the order in which exponents were written. Groups that `x` is too
    /// short to cover count as independent.
    #[must_use]
    pub fn is_linearly_dependent(&self, x: &[f64], tolerance: f64) -> bool {
        self.groups().into_iter().any(|range| {
            let Some(group) = x.get(range) else {
                return false;
            };
            let mut group = group.to_vec();
            group.sort_by(f64::total_cmp);
            group.windows(2).any(|w| (w[1] - w[0]).abs() < tolerance)
        })
    }

    /// Sort the exponents of each group in ascending order. Groups that `x`
    /// is too short to cover are left as they are.
    #[must_use]
    pub fn sort_within_groups(&self, x: &[f64]) -> Vec<f64> {
        let mut out = x.to_vec();
        for range in self.groups() {
            if let Some(group) = out.get_mut(range) {
                group.sort_by(f64::total_cmp);
            }
        }
        out
    }
}

/// Expand even-tempered `(a, b)` pairs into exponents `a * b^j`.
///
/// `counts[k]` is the number of functions in shell `k`; shell `k` reads its
/// pair from `params[2k]` and `params[2k + 1]`.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] when `params` does not hold exactly
/// one pair per shell.
pub fn even_tempered_exponents(params: &[f64], counts: &[usize]) -> Result<Vec<f64>> {
    if params.len() != 2 * counts.len() {
        return Err(Error::DimensionMismatch {
            expected: 2 * counts.len(),
            got: params.len(),
        });
    }
    let mut exponents = Vec::with_capacity(counts.iter().sum());
    for (pair, &n) in params.chunks_exact(2).zip(counts) {
        let (alpha, beta) = (pair[0], pair[1]);
        let mut value = alpha;
        for _ in 0..n {
            exponents.push(value);
            value *= beta;
        }
    }
    Ok(exponents)
}
