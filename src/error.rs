use std::path::PathBuf;

/// Errors raised by the basis-set optimizer.
///
/// Every variant aborts the current run. The optimization loop never turns
/// an error into a placeholder value, because a fabricated sample would
/// silently corrupt the training set.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a required dataset or state file is absent.
    #[error("missing file {}: required by {operation}", path.display())]
    MissingFile {
        /// The file that was expected.
        path: PathBuf,
        /// The operation that needed it.
        operation: &'static str,
    },

    /// Returned when an external job left no energy output behind.
    #[error("missing energy data for system '{system}': {} not found", path.display())]
    MissingEnergyData {
        /// Name of the molecular system.
        system: String,
        /// The energy artifact that was expected.
        path: PathBuf,
    },

    /// Returned when an energy list is shorter than the configured state count.
    #[error("insufficient state data for system '{system}': expected {expected} energies, got {got}")]
    InsufficientStateData {
        /// Name of the molecular system.
        system: String,
        /// Number of energies the configuration requires.
        expected: usize,
        /// Number of energies actually read.
        got: usize,
    },

    /// Returned when the external collaborator fails or produces no output.
    #[error("external job failed for system '{system}': {reason}")]
    ExternalJob {
        /// Name of the molecular system.
        system: String,
        /// Diagnostic from the collaborator.
        reason: String,
    },

    /// Returned when the lower bound is greater than the upper bound.
    #[error("invalid bounds: low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when a parameter vector has the wrong length.
    #[error("dimension mismatch: expected {expected} parameters, got {got}")]
    DimensionMismatch {
        /// The configured number of parameters.
        expected: usize,
        /// The length actually supplied.
        got: usize,
    },

    /// Returned when an operation needs at least one sample.
    #[error("dataset is empty")]
    EmptyDataset,

    /// Returned when a dataset table row cannot be parsed.
    #[error("malformed table {} at line {line}: {reason}", path.display())]
    Table {
        /// The table file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What was wrong with the row.
        reason: String,
    },

    /// Returned when the surrogate covariance matrix cannot be factored.
    #[error("surrogate fit failed: {0}")]
    SurrogateFit(String),

    /// Returned when no search start found a minimum above the edge
    /// threshold.
    #[error("no acceptable candidate: every minimum found was rejected")]
    NoAcceptableCandidate,

    /// Returned when the local simplex minimizer fails.
    #[error("local minimization failed: {0}")]
    LocalSearch(String),

    /// Returned when resuming a run whose penalty weights changed.
    #[error("penalty weights differ from the ones the stored dataset was computed with")]
    WeightMismatch,

    /// Returned when the configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when a storage operation fails.
    #[error("storage error: {0}")]
    Storage(String),

    /// Returned when a parallel job task fails to join.
    #[cfg(feature = "async")]
    #[error("async task error: {0}")]
    TaskError(String),

    /// Returned for underlying I/O failures.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Map an I/O error on `path` to [`Error::MissingFile`] when the file is
    /// absent, keeping every other I/O failure as is.
    pub(crate) fn from_io(
        err: std::io::Error,
        path: &std::path::Path,
        operation: &'static str,
    ) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::MissingFile {
                path: path.to_path_buf(),
                operation,
            }
        } else {
            Error::Io(err)
        }
    }
}
