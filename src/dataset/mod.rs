//! Training and testing datasets of `(parameters, penalty)` samples.
//!
//! A [`Dataset`] is an ordered list of [`Sample`]s. Order does not matter
//! to the surrogate but is preserved so the table files are reproducible.
//! Sanitizing passes ([`Dataset::deduplicate`],
//! [`Dataset::enforce_linear_independence`],
//! [`Dataset::sorted_within_groups`]) are pure: they return a new dataset
//! and leave the original untouched for auditing.
//!
//! # Table format
//!
//! One row per sample, whitespace-delimited: every parameter formatted as
//! ` {:10.5}` followed by the penalty as ` {:15.8}`. See [`Dataset::save`].
//!
//! # Examples
//!
//! ```
//! use basis_optimizer::dataset::{Dataset, Sample};
//!
//! let mut data = Dataset::new();
//! data.push(Sample::new(vec![1.0, 2.0], 3.0));
//! data.push(Sample::new(vec![1.0, 2.0005], 1.0));
//! data.push(Sample::new(vec![4.0, 5.0], 0.5));
//!
//! let clean = data.deduplicate(1e-3);
//! assert_eq!(clean.len(), 2);
//! assert_eq!(clean.minimum().unwrap().value, 0.5);
//! ```

mod table;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::parameter::ParameterSpace;
use crate::rng_util;

/// One evaluated point: a parameter vector and its penalty value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Parameter vector.
    pub parameters: Vec<f64>,
    /// Composite penalty at `parameters`.
    pub value: f64,
}

impl Sample {
    /// Creates a sample.
    #[must_use]
    pub fn new(parameters: Vec<f64>, value: f64) -> Self {
        Self { parameters, value }
    }

    /// Euclidean distance between the parameter vectors of two samples.
    #[must_use]
    pub fn distance(&self, other: &Sample) -> f64 {
        euclidean(&self.parameters, &other.parameters)
    }
}

pub(crate) fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// An ordered collection of samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    /// Creates an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dataset from existing samples, keeping their order.
    #[must_use]
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The samples in insertion order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Iterate over the samples.
    pub fn iter(&self) -> core::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Append a sample.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Parameter vectors, one per sample.
    #[must_use]
    pub fn inputs(&self) -> Vec<Vec<f64>> {
        self.samples.iter().map(|s| s.parameters.clone()).collect()
    }

    /// Penalty values, one per sample.
    #[must_use]
    pub fn targets(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// The sample with the lowest value. The first one wins ties.
    #[must_use]
    pub fn minimum(&self) -> Option<&Sample> {
        self.minimum_index().map(|i| &self.samples[i])
    }

    /// Index of the sample with the lowest value. The first one wins ties.
    #[must_use]
    pub fn minimum_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, s) in self.samples.iter().enumerate() {
            match best {
                Some(b) if s.value >= self.samples[b].value => {}
                _ => best = Some(i),
            }
        }
        best
    }

    /// The sample with the highest value. The first one wins ties.
    #[must_use]
    pub fn maximum(&self) -> Option<&Sample> {
        let mut best: Option<&Sample> = None;
        for s in &self.samples {
            match best {
                Some(b) if s.value <= b.value => {}
                _ => best = Some(s),
            }
        }
        best
    }

    /// Drop every sample lying within `tolerance` (Euclidean, parameters
    /// only) of an earlier surviving sample.
    ///
    /// Quadratic in the number of samples. Idempotent.
    #[must_use]
    pub fn deduplicate(&self, tolerance: f64) -> Dataset {
        let mut kept: Vec<Sample> = Vec::with_capacity(self.samples.len());
        for sample in &self.samples {
            if kept.iter().all(|k| k.distance(sample) >= tolerance) {
                kept.push(sample.clone());
            }
        }
        trace_debug!(
            before = self.samples.len(),
            after = kept.len(),
            "duplicates removed"
        );
        Dataset { samples: kept }
    }

    /// Raise the value of every linearly dependent sample to at least
    /// `penalty_value`.
    ///
    /// A sample is linearly dependent when two exponents of the same
    /// orbital type are closer than `tolerance` (see
    /// [`ParameterSpace::is_linearly_dependent`]). Values are never lowered.
    #[must_use]
    pub fn enforce_linear_independence(
        &self,
        space: &ParameterSpace,
        tolerance: f64,
        penalty_value: f64,
    ) -> Dataset {
        let samples = self
            .samples
            .iter()
            .map(|s| {
                if space.is_linearly_dependent(&s.parameters, tolerance) {
                    Sample::new(s.parameters.clone(), s.value.max(penalty_value))
                } else {
                    s.clone()
                }
            })
            .collect();
        Dataset { samples }
    }

    /// Sort the exponents of each orbital-type group in every sample.
    #[must_use]
    pub fn sorted_within_groups(&self, space: &ParameterSpace) -> Dataset {
        let samples = self
            .samples
            .iter()
            .map(|s| Sample::new(space.sort_within_groups(&s.parameters), s.value))
            .collect();
        Dataset { samples }
    }

    /// Read a dataset table with `n_params` parameter columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingFile`](crate::Error::MissingFile) when the
    /// file does not exist and [`Error::Table`](crate::Error::Table) for a
    /// malformed row.
    pub fn load(path: impl AsRef<Path>, n_params: usize) -> crate::Result<Self> {
        table::read(path.as_ref(), n_params).map(Dataset::from_samples)
    }

    /// Write the full table, replacing `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        table::write(path.as_ref(), &self.samples)
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Sample;
    type IntoIter = core::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

impl FromIterator<Sample> for Dataset {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Dataset {
            samples: iter.into_iter().collect(),
        }
    }
}

/// Draw `size` parameter vectors uniformly inside the bounds of `space`.
///
/// Each dimension is filled column by column from a single
/// `fastrand::Rng` seeded with `seed`, so the same seed and size always
/// reproduce the same points.
#[must_use]
pub fn bootstrap(size: usize, space: &ParameterSpace, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut points = vec![Vec::with_capacity(space.len()); size];
    for bounds in space.bounds() {
        for point in &mut points {
            let v = rng_util::f64_range(&mut rng, bounds.low(), bounds.high());
            point.push(bounds.clamp(v));
        }
    }
    points
}

/// Size, seed and backing file of one bootstrapped dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Number of bootstrap points.
    pub size: usize,
    /// Seed of the bootstrap stream.
    pub seed: u64,
    /// Table file, relative to the work directory.
    pub file: PathBuf,
}

impl DatasetConfig {
    /// Defaults for the training set: 30 points, seed 100001, `training.dat`.
    #[must_use]
    pub fn training() -> Self {
        Self {
            size: 30,
            seed: 100_001,
            file: PathBuf::from("training.dat"),
        }
    }

    /// Defaults for the testing set: 3 points, seed 200001, `testing.dat`.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            size: 3,
            seed: 200_001,
            file: PathBuf::from("testing.dat"),
        }
    }
}
