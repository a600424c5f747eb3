pub mod cancellation;
pub mod config;
pub mod error;

pub use cancellation::{CancellationHandle, CancellationToken};
pub use config::{DecodingStrategy, GenerationConfig, SamplingParams};
pub use error::{GenerationError, GenerationResult};
