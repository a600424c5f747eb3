//! Common error types for spuni.

use thiserror::Error;

/// Errors that can occur during a generation call.
///
/// Configuration is validated exhaustively before the first predictor call,
/// so an [`GenerationError::InvalidConfig`] never burns a model invocation.
/// All other variants abort the current call; partial output already
/// delivered through the streaming callback is not retracted.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Invalid parameter combination, rejected before any prediction.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The external predictor failed mid-generation.
    #[error("Prediction failed: {source}")]
    Prediction {
        #[source]
        source: anyhow::Error,
    },

    /// The tokenizer collaborator failed; propagated unchanged.
    #[error("Tokenization failed: {source}")]
    Tokenization {
        #[source]
        source: anyhow::Error,
    },
}

/// Result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;
