//! Shared row-wise helpers.

use ndarray::{Array2, ArrayViewMut1, ArrayViewMut2, Axis};
use rayon::prelude::*;

/// Numerically stable softmax over a single row.
///
/// Entries equal to `-inf` end up with probability exactly zero. A row whose
/// maximum is `-inf` is left as all zeros.
pub fn softmax_row_inplace(mut row: ArrayViewMut1<'_, f32>) {
    let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        row.fill(0.0);
        return;
    }
    row -= max;
    row.mapv_inplace(|x| x.exp());
    let sum = row.sum();
    row /= sum.max(f32::EPSILON);
}

pub fn softmax_inplace(mut scores: ArrayViewMut2<'_, f32>) {
    scores
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(softmax_row_inplace);
}

/// Approximate GELU (tanh formulation).
pub fn gelu_inplace(mut data: ArrayViewMut2<'_, f32>) {
    let c = (2.0 / std::f32::consts::PI).sqrt();
    data.mapv_inplace(|x| 0.5 * x * (1.0 + (c * (x + 0.044715 * x.powi(3))).tanh()));
}

/// Additive causal mask: position `i` may attend to `0..=i`.
pub fn causal_mask(seq_len: usize) -> Array2<f32> {
    Array2::from_shape_fn((seq_len, seq_len), |(i, j)| {
        if j > i {
            f32::NEG_INFINITY
        } else {
            0.0
        }
    })
}
