//! Weight-file reading for predictor implementations.
//!
//! The engine itself never reads weights; this module exists for the
//! predictor backends that do. Only the safetensors container is supported;
//! files carrying a different binary signature are rejected up front with
//! [`WeightsError::UnsupportedFormat`] instead of being parsed on a guess.

mod safetensors_loader;

pub use safetensors_loader::{DType, SafeTensorsReader, TensorInfo, TensorView};

use thiserror::Error;

/// Errors from the weight reader.
#[derive(Debug, Error)]
pub enum WeightsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file carries a recognizable non-safetensors signature.
    #[error("Unsupported weight format: {0}")]
    UnsupportedFormat(String),

    /// The file claims to be safetensors but its header is malformed.
    #[error("Malformed safetensors header: {0}")]
    Header(String),

    #[error("Tensor not found: {0}")]
    TensorNotFound(String),

    #[error("Unsupported dtype: {0}")]
    UnsupportedDtype(String),
}

/// Result type for weight-loading operations.
pub type WeightsResult<T> = Result<T, WeightsError>;
