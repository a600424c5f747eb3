//! Spuni: an autoregressive text-generation engine.
//!
//! This crate contains the decoding loop, the composable logits-warper
//! pipeline (temperature, repetition penalty, top-k, top-p, min-p) and the
//! token-selection strategies (greedy, multinomial) that turn per-step
//! vocabulary scores into a token sequence. Model inference and
//! tokenization are external collaborators behind the traits in
//! [`traits`].

pub mod common;
pub mod generator;
pub mod ops;
pub mod sampler;
pub mod traits;
pub mod warpers;
pub mod weights;

// Re-export commonly used items
pub use common::{
    CancellationHandle, CancellationToken, DecodingStrategy, GenerationConfig, GenerationError,
    GenerationResult, SamplingParams,
};
pub use generator::{GenerationOutput, Generator, StopReason, StreamedToken, TokenType};
pub use traits::{NextTokenPredictor, Tokenizer};
pub use warpers::LogitsWarper;
pub use weights::{SafeTensorsReader, WeightsError};

// Prelude for easy imports
pub mod prelude {
    pub use crate::common::{CancellationToken, DecodingStrategy, GenerationConfig, SamplingParams};
    pub use crate::generator::{GenerationOutput, Generator, StopReason};
    pub use crate::traits::{NextTokenPredictor, Tokenizer};
}
