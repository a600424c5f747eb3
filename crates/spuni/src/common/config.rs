//! Generation configuration.
//!
//! A [`GenerationConfig`] is an immutable value object: it is validated once
//! at the start of a generation call, before the first predictor invocation,
//! and never mutated by the decoding loop.

use super::error::{GenerationError, GenerationResult};

/// Parameters for sampling-based decoding (Top-K, Top-P, Min-P, Temperature).
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingParams {
    /// Temperature for logit scaling. Must be > 0; 1.0 is a no-op.
    pub temperature: f32,
    /// Keep only the k highest-scoring tokens. `None` disables.
    pub top_k: Option<usize>,
    /// Nucleus threshold in (0, 1]. `None` disables.
    pub top_p: Option<f32>,
    /// Keep tokens with probability >= min_p * max_prob. `None` disables.
    pub min_p: Option<f32>,
    /// Seed for the per-session PRNG. Same seed + same logits = same output.
    /// `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: Some(50),
            top_p: Some(0.9),
            min_p: None,
            seed: None,
        }
    }
}

/// The decoding algorithm and its specific parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodingStrategy {
    /// Select the most likely token (argmax). Deterministic.
    Greedy,
    /// Sample from the warped distribution.
    Sample(SamplingParams),
}

/// The main configuration struct for text generation.
#[derive(Clone, Debug)]
pub struct GenerationConfig {
    /// Maximum number of new tokens to generate, prompt excluded.
    pub max_new_tokens: usize,
    /// Optional cap on the total sequence length, prompt included.
    pub max_length: Option<usize>,
    /// Penalty applied once per distinct token already in the history.
    /// Must be > 0; 1.0 is a no-op.
    pub repetition_penalty: f32,
    /// Ban tokens that would repeat an n-gram of this size. 0 disables.
    pub no_repeat_ngram_size: usize,
    /// Token id that stops generation early. `None` disables early stop.
    pub eos_token_id: Option<u32>,
    /// Greedy or sampled decoding.
    pub strategy: DecodingStrategy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 50,
            max_length: None,
            repetition_penalty: 1.0,
            no_repeat_ngram_size: 0,
            eos_token_id: None,
            strategy: DecodingStrategy::Sample(SamplingParams::default()),
        }
    }
}

impl GenerationConfig {
    /// Convenience constructor for greedy decoding.
    pub fn greedy() -> Self {
        Self {
            strategy: DecodingStrategy::Greedy,
            ..Default::default()
        }
    }

    /// Whether this configuration uses the stochastic sampler.
    pub fn is_sampling(&self) -> bool {
        matches!(self.strategy, DecodingStrategy::Sample(_))
    }

    /// Validates all parameter combinations.
    ///
    /// Called once per generation call, before the first predictor call, so
    /// a malformed request never costs a model invocation.
    pub fn validate(&self) -> GenerationResult<()> {
        if self.repetition_penalty <= 0.0 || !self.repetition_penalty.is_finite() {
            return Err(GenerationError::InvalidConfig(format!(
                "repetition_penalty must be a positive finite number, got {}",
                self.repetition_penalty
            )));
        }

        if let Some(max_length) = self.max_length {
            if max_length == 0 {
                return Err(GenerationError::InvalidConfig(
                    "max_length must be at least 1".to_string(),
                ));
            }
        }

        if let DecodingStrategy::Sample(ref params) = self.strategy {
            if params.temperature <= 0.0 || !params.temperature.is_finite() {
                return Err(GenerationError::InvalidConfig(format!(
                    "temperature must be a positive finite number when sampling, got {}",
                    params.temperature
                )));
            }
            if params.top_k == Some(0) {
                return Err(GenerationError::InvalidConfig(
                    "top_k must be at least 1 when set".to_string(),
                ));
            }
            if let Some(top_p) = params.top_p {
                if !(top_p > 0.0 && top_p <= 1.0) {
                    return Err(GenerationError::InvalidConfig(format!(
                        "top_p must be in (0, 1], got {}",
                        top_p
                    )));
                }
            }
            if let Some(min_p) = params.min_p {
                if !(0.0..=1.0).contains(&min_p) {
                    return Err(GenerationError::InvalidConfig(format!(
                        "min_p must be in [0, 1], got {}",
                        min_p
                    )));
                }
            }
        }

        Ok(())
    }
}
