//! Errors raised by the decoding loop.

use thiserror::Error;

/// Errors that can occur while generating a continuation.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The prompt contained no tokens.
    #[error("prompt must contain at least one token")]
    EmptyPrompt,

    #[error("max_seq_length must be positive")]
    InvalidMaxSeqLength,

    #[error("temperature must be a positive finite number, got {0}")]
    InvalidTemperature(f32),

    #[error("top_k must be at least 1 when set")]
    InvalidTopK,

    /// `prompt_len + max_new_tokens` does not fit in a `usize`.
    #[error("prompt of {prompt_len} tokens plus {max_new_tokens} new tokens overflows the token buffer")]
    LengthOverflow {
        prompt_len: usize,
        max_new_tokens: usize,
    },

    /// The token buffer was asked to hold more tokens than it was allocated for.
    #[error("token buffer is full ({capacity} tokens)")]
    BufferFull { capacity: usize },

    /// The scorer reported an empty vocabulary.
    #[error("scorer vocabulary is empty")]
    EmptyVocabulary,

    /// The scorer returned logits of the wrong shape.
    #[error("scorer returned logits of shape {got:?}, expected ({rows}, {vocab})")]
    LogitShape {
        rows: usize,
        vocab: usize,
        got: (usize, usize),
    },

    /// Logits at this step gave no valid probability distribution
    /// (NaN or infinite entries, or every token masked out).
    #[error("no valid next-token distribution at position {position}")]
    DegenerateDistribution { position: usize },

    /// The sampler picked an index that does not exist in the distribution.
    #[error("sampler returned token {token} outside a vocabulary of {vocab}")]
    SampleOutOfRange { token: usize, vocab: usize },

    /// The scorer itself failed.
    #[error("scorer failed: {0}")]
    Scorer(#[from] anyhow::Error),
}

pub type GenerateResult<T> = Result<T, GenerateError>;
