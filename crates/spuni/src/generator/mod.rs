//! Decoding controller: the autoregressive generation loop.

mod engine;
mod types;


pub use engine::Generator;
pub use types::{GenerationOutput, Phase, StopReason, StreamedToken, TokenType};
