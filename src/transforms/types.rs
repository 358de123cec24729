// Common types for the transforms module

use crate::series::DataError;
use thiserror::Error;

/// Result type for transform wiring and configuration
pub type TransformResult<T> = Result<T, TransformError>;

/// Errors detected while building or configuring transform chains.
///
/// Runtime data problems (degenerate samples) never surface here; transforms
/// skip those samples locally.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Unknown transform: {0}")]
    Unregistered(String),

    #[error("Transform '{name}' expects {expected} inputs, got {actual}")]
    InputArity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Transform '{name}' expects {expected} outputs, got {actual}")]
    OutputArity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid parameters for '{name}': {reason}")]
    InvalidParams { name: String, reason: String },

    #[error("Channel '{0}' is produced by more than one transform")]
    DuplicateOutput(String),

    #[error("Transform graph contains a cycle through '{0}'")]
    Cycle(String),

    #[error("Data error: {0}")]
    Data(#[from] DataError),
}

impl TransformError {
    pub(crate) fn invalid_params(name: &str, reason: impl Into<String>) -> Self {
        TransformError::InvalidParams {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
