//! Pure numeric helpers shared by the warpers and the sampler.
//!
//! Everything in here is stateless: same inputs, same outputs, no shared
//! mutable state, so concurrent sessions need no locking.

use ndarray::Array1;

/// Applies softmax in-place with max subtraction for numerical stability.
///
/// Masked entries at `f32::NEG_INFINITY` exponentiate to 0 probability.
/// An empty array is left empty.
pub fn softmax_1d_inplace(logits: &mut Array1<f32>) {
    if logits.is_empty() {
        return;
    }
    let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    logits.mapv_inplace(|x| (x - max).exp());
    let sum = logits.sum();
    if sum > 0.0 {
        *logits /= sum;
    }
}

/// Allocating softmax. See [`softmax_1d_inplace`].
pub fn softmax_1d(logits: &Array1<f32>) -> Array1<f32> {
    let mut probs = logits.clone();
    softmax_1d_inplace(&mut probs);
    probs
}

/// Log-softmax, numerically stable via the max shift.
pub fn log_softmax_1d(logits: &Array1<f32>) -> Array1<f32> {
    let max_val = logits.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    let shifted = logits - max_val;
    let exp_sum = shifted.mapv(f32::exp).sum();
    shifted - exp_sum.ln()
}

/// Running total over a slice. `cumulative_sum(&[]) == []`.
pub fn cumulative_sum(values: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(values.len());
    let mut total = 0.0f32;
    for &v in values {
        total += v;
        out.push(total);
    }
    out
}

/// First index achieving the maximum value, with that value.
///
/// Ties break toward the lowest index; greedy decoding depends on this for
/// reproducibility. Returns `None` for an empty array.
pub fn argmax(logits: &Array1<f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in logits.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}
