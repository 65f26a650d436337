//! CLI wiring: load a checkpoint, then sample continuations of a prompt.

use anyhow::{Context, Result};
use clap::Parser;
use stablegen_llm::{
    generate_detailed, Checkpoint, GenerationParams, ModelConfig, MultinomialSampler,
    WindowPolicy,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "stablegen", about = "Sample text continuations from a causal language model")]
pub struct Cli {
    /// The prompt to continue.
    #[arg(long, default_value = "Hello, my name is")]
    pub prompt: String,
    /// How many independent samples to draw.
    #[arg(long, default_value_t = 1)]
    pub num_samples: usize,
    /// Generation steps per sample.
    #[arg(long, default_value_t = 50)]
    pub max_new_tokens: usize,
    /// Sample only among the k most likely tokens.
    #[arg(long, default_value_t = 200)]
    pub top_k: usize,
    /// Higher values give more random samples.
    #[arg(long, default_value_t = 0.8)]
    pub temperature: f32,
    /// Directory with model_config.json, model.safetensors and vocab.json.
    /// Without it a tiny randomly initialised model is used.
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,
    /// Seed for the sampling RNG.
    #[arg(long, default_value_t = 1234)]
    pub seed: u64,
    /// Stop a sample as soon as the vocabulary's <eos> token is drawn.
    #[arg(long, default_value_t = false)]
    pub stop_at_eos: bool,
    #[arg(long, value_enum, default_value = "current-length")]
    pub window_policy: WindowArg,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum WindowArg {
    CurrentLength,
    PromptLength,
}

impl From<WindowArg> for WindowPolicy {
    fn from(value: WindowArg) -> WindowPolicy {
        match value {
            WindowArg::CurrentLength => WindowPolicy::CurrentLength,
            WindowArg::PromptLength => WindowPolicy::PromptLength,
        }
    }
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let checkpoint = match &cli.checkpoint_dir {
        Some(dir) => Checkpoint::load(dir)
            .with_context(|| format!("failed to load checkpoint from {}", dir.display()))?,
        None => {
            warn!("no --checkpoint-dir given; using random weights (not pretrained)");
            Checkpoint::random(ModelConfig::tiny(), cli.seed)
        }
    };
    let (mut scorer, tokenizer) = checkpoint.into_parts()?;
    let block_size = scorer.config().block_size;

    let encoded_prompt = tokenizer.encode(&cli.prompt);
    info!(prompt = %cli.prompt, tokens = encoded_prompt.len(), "prompt encoded");

    let params = GenerationParams::new(cli.max_new_tokens, block_size)
        .with_temperature(cli.temperature)
        .with_top_k(Some(cli.top_k))
        .with_eos_id(cli.stop_at_eos.then(|| tokenizer.eos_id()))
        .with_window(cli.window_policy.into());

    let mut sampler = MultinomialSampler::seeded(cli.seed);
    for i in 0..cli.num_samples {
        let start = Instant::now();
        let generation = generate_detailed(&mut scorer, &mut sampler, &encoded_prompt, &params)?;
        let seconds = start.elapsed().as_secs_f64();

        println!("{}", tokenizer.decode(&generation.tokens));
        let tokens_per_sec = if seconds > 0.0 {
            generation.num_generated() as f64 / seconds
        } else {
            0.0
        };
        info!(
            stop_reason = ?generation.stop_reason,
            "Time for inference {}: {:.02} sec total, {:.02} tokens/sec",
            i + 1,
            seconds,
            tokens_per_sec
        );
    }

    Ok(())
}
