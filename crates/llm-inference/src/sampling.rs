//! Turning a logit vector into a sampled token id.
//!
//! The pipeline per step is: scale by `1 / temperature`, optionally mask
//! everything below the k-th largest logit to `-inf`, softmax, then draw.

use ndarray::{Array1, ArrayView1};
use stablegen_kernels::softmax_row_inplace;

/// Divide every logit by `temperature`.
pub fn apply_temperature(logits: &mut Array1<f32>, temperature: f32) {
    *logits /= temperature;
}

/// Mask logits strictly below the k-th largest value to `-inf`.
///
/// `k` is clamped to the vocabulary size. Entries tied with the k-th value
/// survive, so more than `k` entries can stay eligible.
pub fn apply_top_k(logits: &mut Array1<f32>, k: usize) {
    let k = k.min(logits.len());
    if k == 0 || k == logits.len() {
        return;
    }
    let mut sorted = logits.to_vec();
    let (_, kth, _) = sorted.select_nth_unstable_by(k - 1, |a, b| b.total_cmp(a));
    let threshold = *kth;
    logits.mapv_inplace(|x| if x < threshold { f32::NEG_INFINITY } else { x });
}

pub fn softmax(mut logits: Array1<f32>) -> Array1<f32> {
    softmax_row_inplace(logits.view_mut());
    logits
}

/// Temperature, optional top-k, then softmax.
pub fn next_token_probs(
    logits: ArrayView1<'_, f32>,
    temperature: f32,
    top_k: Option<usize>,
) -> Array1<f32> {
    let mut logits = logits.to_owned();
    apply_temperature(&mut logits, temperature);
    if let Some(k) = top_k {
        apply_top_k(&mut logits, k);
    }
    softmax(logits)
}

/// Draws a token id from a probability vector.
pub trait Sampler {
    fn sample(&mut self, probs: ArrayView1<'_, f32>) -> usize;
}

impl<S: Sampler + ?Sized> Sampler for &mut S {
    fn sample(&mut self, probs: ArrayView1<'_, f32>) -> usize {
        (**self).sample(probs)
    }
}

/// Inverse-CDF sampling driven by an explicit RNG handle.
///
/// Reproducibility is the caller's business: seed the handle once and reuse
/// it across generation calls.
#[derive(Debug, Clone)]
pub struct MultinomialSampler {
    rng: fastrand::Rng,
}

impl MultinomialSampler {
    pub fn new(rng: fastrand::Rng) -> Self {
        Self { rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(fastrand::Rng::with_seed(seed))
    }

}

impl Sampler for MultinomialSampler {
    fn sample(&mut self, probs: ArrayView1<'_, f32>) -> usize {
        let total: f32 = probs.iter().filter(|p| **p > 0.0).sum();
        let target = self.rng.f32() * total;

        let mut cumsum = 0.0;
        let mut last_eligible = 0;
        for (idx, &prob) in probs.iter().enumerate() {
            // NaN compares false, so it is skipped along with zeros.
            if !(prob > 0.0) {
                continue;
            }
            last_eligible = idx;
            cumsum += prob;
            if target < cumsum {
                return idx;
            }
        }
        // Rounding can leave target == cumsum at the very end.
        last_eligible
    }
}
