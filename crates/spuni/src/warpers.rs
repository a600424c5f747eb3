//! Logits warpers: composable transformations over the per-step logits.
//!
//! Every stage maps `(token history, logits) -> logits` and is pure. Stages
//! never shrink the vector: filtered entries are masked to
//! `f32::NEG_INFINITY`, which keeps vocabulary indexing stable across the
//! whole pipeline and costs nothing after softmax (exp(-inf) == 0).
//!
//! The pipeline is a plain ordered list applied as a left-to-right fold in
//! caller order; the caller's order is significant (temperature before
//! top-k changes which tokens survive) and is never reordered here.

use std::collections::HashSet;

use ndarray::Array1;

use crate::common::{DecodingStrategy, GenerationConfig};
use crate::ops::softmax_1d;

/// A single logits-processing stage.
///
/// Implementations must be pure and keep the output length equal to the
/// input length.
pub trait LogitsWarper: Send + Sync {
    fn apply(&self, history: &[u32], logits: Array1<f32>) -> Array1<f32>;
}

/// Divides every logit by a fixed temperature.
///
/// Values below 1.0 sharpen the distribution, above 1.0 flatten it.
/// Construction assumes a validated config: temperature > 0.
pub struct Temperature {
    pub temperature: f32,
}

impl LogitsWarper for Temperature {
    fn apply(&self, _history: &[u32], mut logits: Array1<f32>) -> Array1<f32> {
        logits /= self.temperature;
        logits
    }
}

/// Rescales logits of tokens already present in the history.
///
/// Applied once per *distinct* token id: repeated occurrences do not
/// compound the penalty. Positive logits are divided by the penalty,
/// negative ones multiplied, pushing both toward less likely.
pub struct RepetitionPenalty {
    pub penalty: f32,
}

impl LogitsWarper for RepetitionPenalty {
    fn apply(&self, history: &[u32], mut logits: Array1<f32>) -> Array1<f32> {
        if self.penalty == 1.0 {
            return logits;
        }
        let seen: HashSet<u32> = history.iter().copied().collect();
        for token in seen {
            let idx = token as usize;
            if idx < logits.len() {
                let score = logits[idx];
                if score > 0.0 {
                    logits[idx] = score / self.penalty;
                } else {
                    logits[idx] = score * self.penalty;
                }
            }
        }
        logits
    }
}

/// Keeps the `k` highest-scoring tokens, masking the rest.
///
/// `k` is clamped to the vocabulary size. Ties at the cutoff break toward
/// ascending original index (stable sort).
pub struct TopK {
    pub k: usize,
}

impl LogitsWarper for TopK {
    fn apply(&self, _history: &[u32], mut logits: Array1<f32>) -> Array1<f32> {
        let k = self.k.min(logits.len());
        if k == logits.len() {
            return logits;
        }
        let mut indices: Vec<usize> = (0..logits.len()).collect();
        indices.sort_by(|&a, &b| {
            logits[b]
                .partial_cmp(&logits[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for &idx in &indices[k..] {
            logits[idx] = f32::NEG_INFINITY;
        }
        logits
    }
}

/// Nucleus filtering: keeps the smallest descending-probability prefix
/// whose cumulative probability exceeds `p`.
///
/// The entry that pushes the running sum past `p` is still kept; everything
/// after it is masked. Ties break toward ascending original index.
pub struct TopP {
    pub p: f32,
}

impl LogitsWarper for TopP {
    fn apply(&self, _history: &[u32], mut logits: Array1<f32>) -> Array1<f32> {
        let probs = softmax_1d(&logits);

        let mut indices: Vec<usize> = (0..logits.len()).collect();
        indices.sort_by(|&a, &b| {
            probs[b]
                .partial_cmp(&probs[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut cumulative = 0.0f32;
        for (rank, &idx) in indices.iter().enumerate() {
            cumulative += probs[idx];
            if cumulative > self.p {
                for &masked in &indices[rank + 1..] {
                    logits[masked] = f32::NEG_INFINITY;
                }
                break;
            }
        }
        logits
    }
}

/// Keeps tokens whose probability is at least `min_p` times the top token's
/// probability; masks the rest.
pub struct MinP {
    pub min_p: f32,
}

impl LogitsWarper for MinP {
    fn apply(&self, _history: &[u32], mut logits: Array1<f32>) -> Array1<f32> {
        let probs = softmax_1d(&logits);
        let max_prob = probs.fold(0.0f32, |a, &b| a.max(b));
        let cutoff = max_prob * self.min_p;

        for (i, &prob) in probs.iter().enumerate() {
            if prob < cutoff {
                logits[i] = f32::NEG_INFINITY;
            }
        }
        logits
    }
}

/// Bans any token that would complete an n-gram already present in the
/// history.
pub struct NoRepeatNgram {
    pub ngram_size: usize,
}

impl LogitsWarper for NoRepeatNgram {
    fn apply(&self, history: &[u32], mut logits: Array1<f32>) -> Array1<f32> {
        let n = self.ngram_size;
        // Need n-1 trailing tokens to form the current prefix.
        if n == 0 || history.len() < n - 1 {
            return logits;
        }

        let current_prefix = &history[history.len() - (n - 1)..];

        for window in history.windows(n) {
            if &window[..n - 1] == current_prefix {
                let banned = window[n - 1] as usize;
                if banned < logits.len() {
                    logits[banned] = f32::NEG_INFINITY;
                }
            }
        }
        logits
    }
}

/// Applies `warpers` to `logits` as a left-to-right fold.
///
/// An empty pipeline is the identity transform.
pub fn apply_pipeline(
    warpers: &[Box<dyn LogitsWarper>],
    history: &[u32],
    logits: Array1<f32>,
) -> Array1<f32> {
    warpers
        .iter()
        .fold(logits, |acc, warper| warper.apply(history, acc))
}

/// Builds the standard pipeline for a validated config.
///
/// Repetition penalty and n-gram blocking always run since they rescale the
/// scores greedy decoding reads. The distribution filters (temperature,
/// top-k, top-p, min-p) only matter for sampling and are omitted for
/// greedy.
pub fn pipeline_for(config: &GenerationConfig) -> Vec<Box<dyn LogitsWarper>> {
    let mut warpers: Vec<Box<dyn LogitsWarper>> = Vec::new();

    if config.repetition_penalty != 1.0 {
        warpers.push(Box::new(RepetitionPenalty {
            penalty: config.repetition_penalty,
        }));
    }
    if config.no_repeat_ngram_size > 0 {
        warpers.push(Box::new(NoRepeatNgram {
            ngram_size: config.no_repeat_ngram_size,
        }));
    }

    if let DecodingStrategy::Sample(ref params) = config.strategy {
        if params.temperature != 1.0 {
            warpers.push(Box::new(Temperature {
                temperature: params.temperature,
            }));
        }
        if let Some(k) = params.top_k {
            warpers.push(Box::new(TopK { k }));
        }
        if let Some(p) = params.top_p {
            warpers.push(Box::new(TopP { p }));
        }
        if let Some(min_p) = params.min_p {
            warpers.push(Box::new(MinP { min_p }));
        }
    }

    warpers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SamplingParams;
    use ndarray::arr1;

    #[test]
    fn test_temperature_scales_logits() {
        let logits = arr1(&[1.0, 2.0, 4.0]);
        let warped = Temperature { temperature: 2.0 }.apply(&[], logits);
        assert_eq!(warped, arr1(&[0.5, 1.0, 2.0]));
    }

    #[test]
    fn test_repetition_penalty_identity_at_one() {
        let logits = arr1(&[1.0, -2.0, 3.0]);
        let warped = RepetitionPenalty { penalty: 1.0 }.apply(&[0, 1, 2], logits.clone());
        assert_eq!(warped, logits);
    }

    #[test]
    fn test_repetition_penalty_sign_rule() {
        let logits = arr1(&[-1.0, 0.0, 2.0]);
        let warped = RepetitionPenalty { penalty: 2.0 }.apply(&[0, 2], logits);

        assert_eq!(warped[0], -2.0); // negative: multiplied
        assert_eq!(warped[1], 0.0); // not in history
        assert_eq!(warped[2], 1.0); // positive: divided
    }

    #[test]
    fn test_repetition_penalty_is_membership_not_frequency() {
        let logits = arr1(&[8.0, 1.0]);
        // Token 0 appears three times; the penalty must not compound.
        let warped = RepetitionPenalty { penalty: 2.0 }.apply(&[0, 0, 0], logits);
        assert_eq!(warped[0], 4.0);
    }

    #[test]
    fn test_repetition_penalty_ignores_out_of_range_history() {
        let logits = arr1(&[1.0, 2.0]);
        let warped = RepetitionPenalty { penalty: 2.0 }.apply(&[100], logits.clone());
        assert_eq!(warped, logits);
    }

    #[test]
    fn test_top_k_masks_all_but_k() {
        let logits = arr1(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let warped = TopK { k: 3 }.apply(&[], logits);

        let finite: Vec<usize> = warped
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(finite, vec![2, 3, 4]);
        assert_eq!(warped[2], 3.0);
        assert_eq!(warped[3], 4.0);
        assert_eq!(warped[4], 5.0);
        assert_eq!(warped[0], f32::NEG_INFINITY);
        assert_eq!(warped[1], f32::NEG_INFINITY);
    }

    #[test]
    fn test_top_k_larger_than_vocab_keeps_everything() {
        let logits = arr1(&[1.0, 2.0, 3.0]);
        let warped = TopK { k: 10 }.apply(&[], logits.clone());
        assert_eq!(warped, logits);
    }

    #[test]
    fn test_top_k_tie_keeps_lowest_indices() {
        let logits = arr1(&[5.0, 5.0, 5.0, 5.0]);
        let warped = TopK { k: 2 }.apply(&[], logits);

        assert!(warped[0].is_finite());
        assert!(warped[1].is_finite());
        assert_eq!(warped[2], f32::NEG_INFINITY);
        assert_eq!(warped[3], f32::NEG_INFINITY);
    }

    #[test]
    fn test_top_p_keeps_dominant_token() {
        // Index 4 holds nearly all probability mass.
        let logits = arr1(&[0.0, 1.0, 2.0, 3.0, 10.0]);
        let warped = TopP { p: 0.9 }.apply(&[], logits);

        assert!(warped[4].is_finite());
        assert!(
            warped.iter().any(|v| *v == f32::NEG_INFINITY),
            "at least one low-probability token should be masked"
        );
    }

    #[test]
    fn test_top_p_one_keeps_everything() {
        let logits = arr1(&[1.0, 2.0, 3.0, 4.0]);
        let warped = TopP { p: 1.0 }.apply(&[], logits.clone());
        assert_eq!(warped, logits);
    }

    #[test]
    fn test_top_p_includes_crossing_token() {
        // Uniform over 4 tokens: each prob 0.25, cumulative 0.25/0.5/0.75/1.0.
        // With p = 0.6 the third token crosses the threshold and is kept.
        let logits = arr1(&[1.0, 1.0, 1.0, 1.0]);
        let warped = TopP { p: 0.6 }.apply(&[], logits);

        let finite = warped.iter().filter(|v| v.is_finite()).count();
        assert_eq!(finite, 3);
    }

    #[test]
    fn test_min_p_masks_relative_to_max() {
        let logits = arr1(&[1.0, 2.0, 10.0]);
        let warped = MinP { min_p: 0.5 }.apply(&[], logits);

        assert!(warped[2].is_finite());
        assert_eq!(warped[0], f32::NEG_INFINITY);
        assert_eq!(warped[1], f32::NEG_INFINITY);
    }

    #[test]
    fn test_min_p_zero_keeps_everything() {
        let logits = arr1(&[1.0, 2.0, 3.0]);
        let warped = MinP { min_p: 0.0 }.apply(&[], logits.clone());
        assert_eq!(warped, logits);
    }

    #[test]
    fn test_no_repeat_ngram_bans_completing_token() {
        let logits = arr1(&[1.0, 1.0, 1.0, 1.0, 1.0]);
        // History [0,1,2,0,1]: next 2 would repeat the trigram [0,1,2].
        let warped = NoRepeatNgram { ngram_size: 3 }.apply(&[0, 1, 2, 0, 1], logits);

        assert_eq!(warped[2], f32::NEG_INFINITY);
        assert_eq!(warped[0], 1.0);
        assert_eq!(warped[1], 1.0);
    }

    #[test]
    fn test_no_repeat_ngram_short_history_untouched() {
        let logits = arr1(&[1.0, 1.0, 1.0]);
        let warped = NoRepeatNgram { ngram_size: 3 }.apply(&[0], logits);
        assert!(warped.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let logits = arr1(&[1.0, 2.0, 3.0]);
        let warped = apply_pipeline(&[], &[0, 1], logits.clone());
        assert_eq!(warped, logits);
    }

    #[test]
    fn test_pipeline_applies_in_caller_order() {
        // Temperature then top-k masks after sharpening; reversing the
        // stages still masks the same indices here, but the surviving
        // values differ, which pins the fold order.
        let logits = arr1(&[1.0, 2.0, 4.0]);
        let pipeline: Vec<Box<dyn LogitsWarper>> = vec![
            Box::new(Temperature { temperature: 2.0 }),
            Box::new(TopK { k: 1 }),
        ];
        let warped = apply_pipeline(&pipeline, &[], logits);

        assert_eq!(warped[2], 2.0); // 4.0 / 2.0, then kept
        assert_eq!(warped[0], f32::NEG_INFINITY);
        assert_eq!(warped[1], f32::NEG_INFINITY);
    }

    #[test]
    fn test_pipeline_for_greedy_skips_distribution_filters() {
        let config = GenerationConfig {
            repetition_penalty: 1.5,
            strategy: DecodingStrategy::Greedy,
            ..Default::default()
        };
        // Only the repetition penalty survives for greedy decoding.
        assert_eq!(pipeline_for(&config).len(), 1);

        let config = GenerationConfig::greedy();
        assert!(pipeline_for(&config).is_empty());
    }

    #[test]
    fn test_pipeline_for_sampling_includes_filters() {
        let config = GenerationConfig {
            strategy: DecodingStrategy::Sample(SamplingParams {
                temperature: 0.7,
                top_k: Some(50),
                top_p: Some(0.9),
                min_p: Some(0.1),
                seed: None,
            }),
            ..Default::default()
        };
        // temperature + top-k + top-p + min-p
        assert_eq!(pipeline_for(&config).len(), 4);
    }
}
