//! External collaborator traits.
//!
//! The engine never touches model weights or vocabulary files directly: it
//! consumes logits through [`NextTokenPredictor`] and crosses the text
//! boundary through [`Tokenizer`]. Both are object-safe so callers can hand
//! in `Arc<dyn ...>` backends.

use anyhow::Result;
use async_trait::async_trait;
use ndarray::Array1;

/// Produces next-token logits for a token sequence.
///
/// One call covers the full current sequence; the returned vector has
/// exactly vocabulary-size entries. This is the decoding loop's only
/// suspension point. Errors abort the generation call with no retry.
#[async_trait]
pub trait NextTokenPredictor: Send + Sync {
    async fn predict(&self, tokens: &[u32]) -> Result<Array1<f32>>;

    /// Vocabulary size of the model behind this predictor.
    fn vocab_size(&self) -> usize;
}

/// Text <-> token-id conversion.
///
/// Used only at the prompt boundary and for streaming text formatting,
/// never inside the warper/sampler core.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
    fn decode(&self, tokens: &[u32]) -> Result<String>;
}
