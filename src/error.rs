//! Error types for the experiment dashboard.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, DashboardError>;

/// Errors that can occur while loading and assembling experiments.
///
/// Per-record problems (a missing prompt, an out-of-range score) are not
/// errors: they are reported through [`crate::validator::ValidationReport`].
#[derive(Error, Debug)]
pub enum DashboardError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The raw results were parsed but are not a JSON array.
    #[error("Results for '{0}' must be an array")]
    StructuralFailure(String),

    /// The raw results for an experiment could not be fetched.
    #[error("Failed to load experiment '{name}': {reason}")]
    LoadFailure { name: String, reason: String },

    /// The experiment is not listed in the experiment index.
    #[error("Experiment '{0}' not found in the experiment index")]
    ExperimentNotFound(String),

    /// No experiment carries the requested version number.
    #[error("No experiment with version {0}")]
    VersionNotFound(u32),

    /// The experiment index is not a 1-based, contiguous, unique ordering.
    #[error("Invalid experiment index: {0}")]
    InvalidIndex(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DashboardError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a load failure for the named experiment.
    pub fn load(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::LoadFailure {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        DashboardError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        DashboardError::Serialization(err.to_string())
    }
}
