//! Token selection: greedy argmax or multinomial sampling.
//!
//! The sampler sees the *final* logits, after the warper pipeline has run.
//! Randomness is an explicit injected generator, never global state, so a
//! seeded session replays exactly and concurrent sessions cannot interfere.

use anyhow::{anyhow, Result};
use ndarray::Array1;
use rand::Rng;

use crate::common::DecodingStrategy;
use crate::ops::{argmax, softmax_1d};

/// Selects the next token per the configured strategy.
///
/// Greedy ignores the RNG entirely; multinomial draws one uniform value
/// from it.
pub fn sample_token<R: Rng>(
    logits: &Array1<f32>,
    strategy: &DecodingStrategy,
    rng: &mut R,
) -> Result<u32> {
    match strategy {
        DecodingStrategy::Greedy => greedy(logits),
        DecodingStrategy::Sample(_) => {
            let probs = softmax_1d(logits);
            multinomial(&probs, rng)
        }
    }
}

/// Deterministic argmax selection; ties break toward the lowest index.
pub fn greedy(logits: &Array1<f32>) -> Result<u32> {
    argmax(logits)
        .map(|(idx, _)| idx as u32)
        .ok_or_else(|| anyhow!("cannot select a token from an empty logits vector"))
}

/// Draws one token from a probability distribution.
///
/// The draw is scaled by the actual sum of `probs`, so distributions that
/// miss 1.0 by floating-point rounding still sample correctly. Masked
/// entries carry zero probability and are never selected; if rounding lets
/// the scan run past the end, the last index with nonzero probability is
/// returned.
pub fn multinomial<R: Rng>(probs: &Array1<f32>, rng: &mut R) -> Result<u32> {
    if probs.is_empty() {
        return Err(anyhow!("cannot sample from an empty distribution"));
    }

    let total: f32 = probs.sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(anyhow!(
            "degenerate distribution: probabilities sum to {}",
            total
        ));
    }

    let draw: f32 = rng.gen::<f32>() * total;

    let mut cumulative = 0.0f32;
    let mut last_valid = None;
    for (idx, &prob) in probs.iter().enumerate() {
        if prob > 0.0 {
            last_valid = Some(idx as u32);
        }
        cumulative += prob;
        if cumulative > draw {
            return Ok(idx as u32);
        }
    }

    // Rounding pushed the draw past the final cumulative value.
    last_valid.ok_or_else(|| anyhow!("no token with nonzero probability"))
}
