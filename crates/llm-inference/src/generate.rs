//! Autoregressive decoding loop.

use crate::buffer::{TokenBuffer, WindowPolicy};
use crate::error::{GenerateError, GenerateResult};
use crate::sampling::{next_token_probs, Sampler};
use ndarray::Array2;
use tracing::{debug, trace};

/// Anything that maps a context of token ids to next-token logits.
pub trait Scorer {
    fn vocab_size(&self) -> usize;

    /// Logits for every position of `context`, shape `(context.len(), vocab_size)`.
    ///
    /// `context` is a single sequence (batch size one) and is never empty.
    fn forward(&mut self, context: &[usize]) -> anyhow::Result<Array2<f32>>;
}

impl<S: Scorer + ?Sized> Scorer for &mut S {
    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }

    fn forward(&mut self, context: &[usize]) -> anyhow::Result<Array2<f32>> {
        (**self).forward(context)
    }
}

impl<S: Scorer + ?Sized> Scorer for Box<S> {
    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }

    fn forward(&mut self, context: &[usize]) -> anyhow::Result<Array2<f32>> {
        (**self).forward(context)
    }
}

/// Read-only settings for one `generate` call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    /// Longest context the scorer accepts.
    pub max_seq_length: usize,
    pub temperature: f32,
    pub top_k: Option<usize>,
    /// Stop as soon as this token is sampled. The token is kept in the output.
    pub eos_id: Option<usize>,
    pub window: WindowPolicy,
}

impl GenerationParams {
    pub fn new(max_new_tokens: usize, max_seq_length: usize) -> Self {
        Self {
            max_new_tokens,
            max_seq_length,
            temperature: 1.0,
            top_k: None,
            eos_id: None,
            window: WindowPolicy::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_eos_id(mut self, eos_id: Option<usize>) -> Self {
        self.eos_id = eos_id;
        self
    }

    pub fn with_window(mut self, window: WindowPolicy) -> Self {
        self.window = window;
        self
    }

    pub fn validate(&self) -> GenerateResult<()> {
        if self.max_seq_length == 0 {
            return Err(GenerateError::InvalidMaxSeqLength);
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(GenerateError::InvalidTemperature(self.temperature));
        }
        if self.top_k == Some(0) {
            return Err(GenerateError::InvalidTopK);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The EOS token was sampled.
    Eos,
    /// All `max_new_tokens` steps ran.
    MaxNewTokens,
}

/// Output of [`generate_detailed`].
#[derive(Debug, Clone)]
pub struct Generation {
    /// Prompt followed by the continuation.
    pub tokens: Vec<usize>,
    pub prompt_len: usize,
    pub stop_reason: StopReason,
}

impl Generation {
    pub fn new_tokens(&self) -> &[usize] {
        &self.tokens[self.prompt_len..]
    }

    pub fn num_generated(&self) -> usize {
        self.tokens.len() - self.prompt_len
    }
}

/// Continue `prompt` one sampled token at a time.
///
/// Returns the prompt followed by up to `max_new_tokens` generated ids. When
/// `eos_id` is sampled the sequence ends with it.
pub fn generate<S, R>(
    scorer: &mut S,
    sampler: &mut R,
    prompt: &[usize],
    params: &GenerationParams,
) -> GenerateResult<Vec<usize>>
where
    S: Scorer + ?Sized,
    R: Sampler + ?Sized,
{
    generate_detailed(scorer, sampler, prompt, params).map(|generation| generation.tokens)
}

/// Like [`generate`] but also reports why decoding stopped.
pub fn generate_detailed<S, R>(
    scorer: &mut S,
    sampler: &mut R,
    prompt: &[usize],
    params: &GenerationParams,
) -> GenerateResult<Generation>
where
    S: Scorer + ?Sized,
    R: Sampler + ?Sized,
{
    params.validate()?;
    if prompt.is_empty() {
        return Err(GenerateError::EmptyPrompt);
    }

    let mut buffer = TokenBuffer::new(prompt, params.max_new_tokens)?;
    let vocab = scorer.vocab_size();
    if params.max_new_tokens > 0 && vocab == 0 {
        return Err(GenerateError::EmptyVocabulary);
    }

    debug!(
        prompt_len = prompt.len(),
        max_new_tokens = params.max_new_tokens,
        max_seq_length = params.max_seq_length,
        temperature = params.temperature,
        top_k = ?params.top_k,
        "starting generation"
    );

    while !buffer.is_full() {
        let context = buffer.window(params.max_seq_length, params.window);
        let context_len = context.len();
        let logits = scorer.forward(context)?;

        let (rows, cols) = logits.dim();
        if rows != context_len || cols != vocab {
            return Err(GenerateError::LogitShape {
                rows: context_len,
                vocab,
                got: (rows, cols),
            });
        }

        let position = buffer.len();
        let probs = next_token_probs(logits.row(rows - 1), params.temperature, params.top_k);
        if !probs.iter().all(|p| p.is_finite()) || !(probs.sum() > 0.0) {
            return Err(GenerateError::DegenerateDistribution { position });
        }

        let token = sampler.sample(probs.view());
        if token >= vocab {
            return Err(GenerateError::SampleOutOfRange { token, vocab });
        }

        buffer.push(token)?;
        trace!(position, token, context_len, "sampled token");

        if params.eos_id == Some(token) {
            debug!(position, "eos sampled, stopping");
            return Ok(Generation {
                prompt_len: buffer.prompt_len(),
                tokens: buffer.into_tokens(),
                stop_reason: StopReason::Eos,
            });
        }
    }

    Ok(Generation {
        prompt_len: buffer.prompt_len(),
        tokens: buffer.into_tokens(),
        stop_reason: StopReason::MaxNewTokens,
    })
}
