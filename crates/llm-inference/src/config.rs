//! Model configuration, read from `model_config.json` in a checkpoint directory.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_rope_theta() -> f32 {
    10000.0
}

fn default_layer_norm_eps() -> f32 {
    1e-5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub d_model: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub d_ff: usize,
    /// Longest context the model supports; used as `max_seq_length` when decoding.
    #[serde(alias = "max_seq_len")]
    pub block_size: usize,
    #[serde(default = "default_rope_theta")]
    pub rope_theta: f32,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f32,
}

impl ModelConfig {
    /// Tiny config for the random-weights demo mode and tests.
    pub fn tiny() -> Self {
        Self {
            vocab_size: 128,
            d_model: 64,
            n_layers: 2,
            n_heads: 4,
            d_ff: 256,
            block_size: 256,
            rope_theta: default_rope_theta(),
            layer_norm_eps: default_layer_norm_eps(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let blob = fs::read_to_string(path)
            .with_context(|| format!("failed to read model config {}", path.display()))?;
        let config: Self = serde_json::from_str(&blob)
            .with_context(|| format!("failed to parse model config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.vocab_size > 0, "vocab_size must be positive");
        ensure!(self.d_model > 0, "d_model must be positive");
        ensure!(self.n_heads > 0, "n_heads must be positive");
        ensure!(self.d_ff > 0, "d_ff must be positive");
        ensure!(self.block_size > 0, "block_size must be positive");
        ensure!(
            self.d_model % self.n_heads == 0,
            "d_model {} is not divisible by n_heads {}",
            self.d_model,
            self.n_heads
        );
        ensure!(
            self.head_dim() % 2 == 0,
            "head_dim {} must be even for rotary embeddings",
            self.head_dim()
        );
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.d_model / self.n_heads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_config_is_valid() {
        ModelConfig::tiny().validate().unwrap();
        assert_eq!(ModelConfig::tiny().head_dim(), 16);
    }

    #[test]
    fn parses_json_with_defaults_and_alias() {
        let config: ModelConfig = serde_json::from_str(
            r#"{"vocab_size": 10, "d_model": 8, "n_layers": 1, "n_heads": 2, "d_ff": 16, "max_seq_len": 32}"#,
        )
        .unwrap();
        assert_eq!(config.block_size, 32);
        assert_eq!(config.rope_theta, 10000.0);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_indivisible_heads() {
        let config = ModelConfig {
            n_heads: 3,
            ..ModelConfig::tiny()
        };
        assert!(config.validate().is_err());
    }
}
