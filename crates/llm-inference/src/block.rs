//! Pre-LN transformer block: causal self-attention + GELU MLP.

use crate::config::ModelConfig;
use crate::rope::RotaryEmbedding;
use crate::weights::BlockWeights;
use anyhow::Result;
use ndarray::{s, Array2, ArrayView2};
use stablegen_kernels::{causal_attention, gelu_inplace, layer_norm};

pub struct TransformerBlock {
    n_heads: usize,
    head_dim: usize,
    eps: f32,
}

impl TransformerBlock {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            n_heads: config.n_heads,
            head_dim: config.head_dim(),
            eps: config.layer_norm_eps,
        }
    }

    /// x: (seq_len, d_model) hidden states, row `i` at position `i`.
    pub fn forward(
        &self,
        x: ArrayView2<'_, f32>,
        weights: &BlockWeights,
        rope: &RotaryEmbedding,
    ) -> Result<Array2<f32>> {
        let x_norm = layer_norm(
            x,
            weights.ln1_weight.view(),
            weights.ln1_bias.view(),
            self.eps,
        )?;
        let x = &x + &self.self_attention(x_norm.view(), weights, rope)?;

        let x_norm = layer_norm(
            x.view(),
            weights.ln2_weight.view(),
            weights.ln2_bias.view(),
            self.eps,
        )?;
        Ok(&x + &self.mlp(x_norm.view(), weights))
    }

    fn self_attention(
        &self,
        x: ArrayView2<'_, f32>,
        weights: &BlockWeights,
        rope: &RotaryEmbedding,
    ) -> Result<Array2<f32>> {
        let mut q = x.dot(&weights.q_proj);
        let mut k = x.dot(&weights.k_proj);
        let v = x.dot(&weights.v_proj);

        let scale = 1.0 / (self.head_dim as f32).sqrt();
        let mut heads = Array2::<f32>::zeros(q.dim());
        for h in 0..self.n_heads {
            let (start, end) = (h * self.head_dim, (h + 1) * self.head_dim);
            rope.apply(q.slice_mut(s![.., start..end]))?;
            rope.apply(k.slice_mut(s![.., start..end]))?;

            let out = causal_attention(
                q.slice(s![.., start..end]),
                k.slice(s![.., start..end]),
                v.slice(s![.., start..end]),
                scale,
            )?;
            heads.slice_mut(s![.., start..end]).assign(&out);
        }

        Ok(heads.dot(&weights.out_proj))
    }

    fn mlp(&self, x: ArrayView2<'_, f32>, weights: &BlockWeights) -> Array2<f32> {
        let mut hidden = x.dot(&weights.mlp_up);
        gelu_inplace(hidden.view_mut());
        hidden.dot(&weights.mlp_down)
    }
}
