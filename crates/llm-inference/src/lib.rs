//! Autoregressive text generation from a causal language model.
//!
//! The core is [`generate`]: given a prompt it asks a [`Scorer`] for next-token
//! logits, shapes them with temperature and top-k, and samples one token at a
//! time until `max_new_tokens` is exhausted or the EOS token appears.
//!
//! The crate also ships a small reference transformer ([`TransformerScorer`]),
//! safetensors weight loading and a word-level tokenizer so a checkpoint
//! directory can be run end to end.

pub mod block;
pub mod buffer;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod generate;
pub mod model;
pub mod rope;
pub mod sampling;
pub mod tokenizer;
pub mod weights;

pub use buffer::{TokenBuffer, WindowPolicy};
pub use checkpoint::Checkpoint;
pub use config::ModelConfig;
pub use error::{GenerateError, GenerateResult};
pub use generate::{generate, generate_detailed, Generation, GenerationParams, Scorer, StopReason};
pub use model::TransformerScorer;
pub use sampling::{MultinomialSampler, Sampler};
pub use tokenizer::WordTokenizer;
pub use weights::ModelWeights;
