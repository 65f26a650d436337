//! Checkpoint directory loading: config, weights and vocabulary.

use crate::config::ModelConfig;
use crate::model::TransformerScorer;
use crate::tokenizer::WordTokenizer;
use crate::weights::ModelWeights;
use anyhow::{ensure, Context, Result};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::info;

pub const CONFIG_FILE: &str = "model_config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const VOCAB_FILE: &str = "vocab.json";

pub struct Checkpoint {
    pub config: ModelConfig,
    pub weights: ModelWeights,
    pub tokenizer: WordTokenizer,
}

impl Checkpoint {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        ensure!(
            dir.is_dir(),
            "checkpoint dir {} must be a directory with {}, {} and {}",
            dir.display(),
            CONFIG_FILE,
            WEIGHTS_FILE,
            VOCAB_FILE
        );

        let config = ModelConfig::from_file(dir.join(CONFIG_FILE))?;
        let weights_path = dir.join(WEIGHTS_FILE);
        info!(path = %weights_path.display(), config = ?config, "loading model");

        let start = Instant::now();
        let weights = ModelWeights::load_safetensors(&weights_path, &config)?;
        info!(
            seconds = start.elapsed().as_secs_f64(),
            "time to load model"
        );

        let tokenizer = WordTokenizer::from_vocab_file(dir.join(VOCAB_FILE))?;
        ensure!(
            tokenizer.vocab_size() <= config.vocab_size,
            "vocabulary has {} ids but the model only scores {}",
            tokenizer.vocab_size(),
            config.vocab_size
        );

        Ok(Self {
            config,
            weights,
            tokenizer,
        })
    }

    /// Random weights with the builtin vocabulary.
    pub fn random(config: ModelConfig, seed: u64) -> Self {
        let weights = ModelWeights::random(&config, seed);
        let tokenizer = WordTokenizer::builtin(config.vocab_size);
        Self {
            config,
            weights,
            tokenizer,
        }
    }

    /// Write config, weights and vocabulary into `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        fs::write(dir.join(CONFIG_FILE), serde_json::to_vec_pretty(&self.config)?)?;
        fs::write(
            dir.join(VOCAB_FILE),
            serde_json::to_vec_pretty(self.tokenizer.vocab())?,
        )?;
        self.weights.save_safetensors(dir.join(WEIGHTS_FILE))
    }

    pub fn into_parts(self) -> Result<(TransformerScorer, WordTokenizer)> {
        let scorer = TransformerScorer::new(self.config, self.weights)?;
        Ok((scorer, self.tokenizer))
    }
}
