//! Error Handling Module
//!
//! Defines the error type for the grape leaf classifier.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for classifier operations
#[derive(Error, Debug)]
pub enum GrapeLeafError {
    /// An uploaded image could not be accepted or decoded
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The training or validation data on disk is malformed
    #[error("Dataset error at '{0}': {1}")]
    Dataset(PathBuf, String),

    /// The persisted model artifact is missing, corrupt or incompatible
    #[error("Failed to load model artifact '{0}': {1}")]
    ArtifactLoad(PathBuf, String),

    /// Training loss became NaN or infinite
    #[error("Training diverged at epoch {epoch}, step {step}: loss = {loss}")]
    NumericDivergence { epoch: usize, step: usize, loss: f64 },

    /// Error reading tensor data back from the backend
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GrapeLeafError {
    /// Shorthand for a dataset error at the given path
    pub fn dataset(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Dataset(path.into(), reason.into())
    }

    /// Shorthand for an artifact load error at the given path
    pub fn artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ArtifactLoad(path.into(), reason.into())
    }

    /// Whether the end user can fix this error by supplying a different image
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::InvalidImage(_))
    }
}

impl From<serde_json::Error> for GrapeLeafError {
    fn from(err: serde_json::Error) -> Self {
        GrapeLeafError::Serialization(err.to_string())
    }
}

/// Convenience Result type for classifier operations
pub type Result<T> = std::result::Result<T, GrapeLeafError>;
