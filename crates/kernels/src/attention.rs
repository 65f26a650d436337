//! Attention mechanism kernels.

use crate::utils::{causal_mask, softmax_inplace};
use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayView2};

pub fn scaled_dot_product_attention(
    query: ArrayView2<'_, f32>,
    key: ArrayView2<'_, f32>,
    value: ArrayView2<'_, f32>,
    mask: Option<ArrayView2<'_, f32>>,
    scale: f32,
) -> Result<Array2<f32>> {
    ensure!(
        query.ncols() == key.ncols(),
        "query dim {} must match key dim {}",
        query.ncols(),
        key.ncols()
    );
    let mut scores = query.dot(&key.t());
    scores *= scale;

    if let Some(mask) = mask {
        ensure!(
            mask.dim() == scores.dim(),
            "mask shape {:?} incompatible with attention scores {:?}",
            mask.dim(),
            scores.dim()
        );
        scores += &mask;
    }

    softmax_inplace(scores.view_mut());
    ensure!(
        scores.ncols() == value.nrows(),
        "scores column count {} differs from value rows {}",
        scores.ncols(),
        value.nrows()
    );
    Ok(scores.dot(&value))
}

/// Self-attention where every query row only sees keys at or before its own position.
pub fn causal_attention(
    query: ArrayView2<'_, f32>,
    key: ArrayView2<'_, f32>,
    value: ArrayView2<'_, f32>,
    scale: f32,
) -> Result<Array2<f32>> {
    ensure!(
        query.nrows() == key.nrows(),
        "causal attention needs matching query/key lengths, got {} and {}",
        query.nrows(),
        key.nrows()
    );
    let mask = causal_mask(query.nrows());
    scaled_dot_product_attention(query, key, value, Some(mask.view()), scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn first_position_attends_only_to_itself() {
        let q = array![[1.0f32, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let k = q.clone();
        let v = array![[1.0f32, 2.0], [10.0, 20.0], [100.0, 200.0]];

        let out = causal_attention(q.view(), k.view(), v.view(), 1.0).expect("attention");
        assert_abs_diff_eq!(out[(0, 0)], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out[(0, 1)], 2.0, epsilon = 1e-5);
        // Row 1 mixes positions 0 and 1 only.
        assert!(out[(1, 0)] <= 10.0);
    }

    #[test]
    fn mask_shape_is_checked() {
        let q = Array2::<f32>::ones((2, 4));
        let mask = Array2::<f32>::zeros((3, 3));
        let err = scaled_dot_product_attention(q.view(), q.view(), q.view(), Some(mask.view()), 1.0);
        assert!(err.is_err());
    }
}
