//! Rotary position embeddings.
//!
//! Reference: https://arxiv.org/abs/2104.09864

use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayViewMut2};

pub struct RotaryEmbedding {
    /// (max_positions, head_dim / 2)
    cos: Array2<f32>,
    sin: Array2<f32>,
}

impl RotaryEmbedding {
    pub fn new(max_positions: usize, head_dim: usize, theta: f32) -> Self {
        let half = head_dim / 2;
        let angle = |pos: usize, i: usize| {
            let freq = 1.0 / theta.powf((2 * i) as f32 / head_dim as f32);
            pos as f32 * freq
        };
        let cos = Array2::from_shape_fn((max_positions, half), |(p, i)| angle(p, i).cos());
        let sin = Array2::from_shape_fn((max_positions, half), |(p, i)| angle(p, i).sin());
        Self { cos, sin }
    }

    pub fn max_positions(&self) -> usize {
        self.cos.nrows()
    }

    /// Rotate adjacent feature pairs of a (seq_len, head_dim) slice in place.
    /// Row `r` is treated as absolute position `r`.
    pub fn apply(&self, mut qk: ArrayViewMut2<'_, f32>) -> Result<()> {
        let (seq_len, feat_dim) = qk.dim();
        ensure!(
            seq_len <= self.max_positions(),
            "sequence of {} exceeds {} rotary positions",
            seq_len,
            self.max_positions()
        );
        ensure!(
            feat_dim == 2 * self.cos.ncols(),
            "head dim {} does not match rotary table {}",
            feat_dim,
            2 * self.cos.ncols()
        );

        for pos in 0..seq_len {
            for i in 0..self.cos.ncols() {
                let (d0, d1) = (2 * i, 2 * i + 1);
                let x0 = qk[[pos, d0]];
                let x1 = qk[[pos, d1]];
                let c = self.cos[[pos, i]];
                let s = self.sin[[pos, i]];
                qk[[pos, d0]] = x0 * c - x1 * s;
                qk[[pos, d1]] = x0 * s + x1 * c;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn position_zero_is_identity() {
        let rope = RotaryEmbedding::new(16, 8, 10000.0);
        let mut qk = Array2::from_shape_fn((1, 8), |(_, j)| j as f32);
        let before = qk.clone();
        rope.apply(qk.view_mut()).unwrap();
        for (a, b) in qk.iter().zip(before.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn rotation_preserves_pair_norm() {
        let rope = RotaryEmbedding::new(16, 4, 10000.0);
        let mut qk = Array2::<f32>::ones((5, 4));
        rope.apply(qk.view_mut()).unwrap();
        let norm = (qk[[4, 0]].powi(2) + qk[[4, 1]].powi(2)).sqrt();
        assert_abs_diff_eq!(norm, 2f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn too_many_positions_is_an_error() {
        let rope = RotaryEmbedding::new(2, 4, 10000.0);
        let mut qk = Array2::<f32>::ones((3, 4));
        assert!(rope.apply(qk.view_mut()).is_err());
    }
}
