//! Reference transformer scorer: embeddings, block stack, LM head.

use crate::block::TransformerBlock;
use crate::config::ModelConfig;
use crate::generate::Scorer;
use crate::rope::RotaryEmbedding;
use crate::weights::ModelWeights;
use anyhow::{ensure, Result};
use ndarray::Array2;
use stablegen_kernels::layer_norm;

/// Decoder-only transformer that re-scores the full context on every call.
///
/// There is no KV-cache: the decoding window slides once the sequence
/// outgrows `block_size`, which shifts every position.
pub struct TransformerScorer {
    config: ModelConfig,
    weights: ModelWeights,
    block: TransformerBlock,
    rope: RotaryEmbedding,
}

impl TransformerScorer {
    pub fn new(config: ModelConfig, weights: ModelWeights) -> Result<Self> {
        config.validate()?;
        ensure!(
            weights.layers.len() == config.n_layers,
            "weights hold {} layers, config expects {}",
            weights.layers.len(),
            config.n_layers
        );
        ensure!(
            weights.token_embeddings.dim() == (config.vocab_size, config.d_model),
            "token embeddings have shape {:?}",
            weights.token_embeddings.dim()
        );
        ensure!(
            weights.lm_head.dim() == (config.d_model, config.vocab_size),
            "lm head has shape {:?}",
            weights.lm_head.dim()
        );

        let block = TransformerBlock::new(&config);
        let rope = RotaryEmbedding::new(config.block_size, config.head_dim(), config.rope_theta);
        Ok(Self {
            config,
            weights,
            block,
            rope,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl Scorer for TransformerScorer {
    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn forward(&mut self, context: &[usize]) -> Result<Array2<f32>> {
        let seq_len = context.len();
        ensure!(seq_len > 0, "context must not be empty");
        ensure!(
            seq_len <= self.config.block_size,
            "context of {} tokens exceeds block size {}",
            seq_len,
            self.config.block_size
        );

        // Embedding lookup
        let mut hidden = Array2::<f32>::zeros((seq_len, self.config.d_model));
        for (i, &token_id) in context.iter().enumerate() {
            ensure!(
                token_id < self.config.vocab_size,
                "token id {} outside vocabulary of {}",
                token_id,
                self.config.vocab_size
            );
            hidden
                .row_mut(i)
                .assign(&self.weights.token_embeddings.row(token_id));
        }

        for layer_weights in &self.weights.layers {
            hidden = self.block.forward(hidden.view(), layer_weights, &self.rope)?;
        }

        let normed = layer_norm(
            hidden.view(),
            self.weights.final_ln_weight.view(),
            self.weights.final_ln_bias.view(),
            self.config.layer_norm_eps,
        )?;

        // (seq_len, d_model) @ (d_model, vocab_size)
        Ok(normed.dot(&self.weights.lm_head))
    }
}
