//! Core enums shared across the crate.

use core::fmt;

use serde::{Deserialize, Serialize};

/// What a single invocation of the program should do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Bootstrap and evaluate the training set.
    GenerateTraining,
    /// Bootstrap and evaluate the testing set.
    GenerateTesting,
    /// Run the surrogate loop (creating the testing set first when absent).
    #[default]
    RunOptimization,
    /// All of the above, in order.
    All,
}

/// Which of the two bootstrapped datasets an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetRole {
    /// Points the surrogate is fitted on.
    Training,
    /// Held-out points used to report surrogate accuracy.
    Testing,
}

impl fmt::Display for DatasetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Training => f.write_str("training"),
            Self::Testing => f.write_str("testing"),
        }
    }
}
