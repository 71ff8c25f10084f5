//! Error types shared by the physics, twin, explanation and mining layers.

use thiserror::Error;

/// Errors that can occur while building or applying a context model.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Malformed or mismatched input arrays.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not enough valid training samples to fit the twin.
    #[error("Insufficient history: need at least {required} valid samples, got {available}")]
    InsufficientHistory {
        /// Minimum number of valid samples.
        required: usize,
        /// Valid samples found in the history.
        available: usize,
    },

    /// Prediction or explanation requested before a model was fitted.
    #[error("Model not fitted - call fit() with a training history first")]
    NotFitted,

    /// Not enough session summaries to mine rules.
    #[error("Insufficient data: need at least {required} sessions, got {available}")]
    InsufficientData {
        /// Minimum number of sessions.
        required: usize,
        /// Sessions provided.
        available: usize,
    },

    /// Numerical failure inside a regressor.
    #[error("Regression failed: {0}")]
    Regression(String),
}

/// Result type for context operations.
pub type ContextResult<T> = Result<T, ContextError>;
