//! Fixed-capacity token buffer used by the decoding loop.

use crate::error::{GenerateError, GenerateResult};

/// How the scorer context is cropped once the sequence outgrows `max_seq_length`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Crop to the last `max_seq_length` tokens whenever the current sequence is longer.
    #[default]
    CurrentLength,
    /// Crop only when the prompt alone is longer than `max_seq_length`.
    /// A short prompt followed by a long generation is never cropped.
    PromptLength,
}

/// Token ids for one generation call.
///
/// The whole `prompt + max_new_tokens` capacity is allocated up front and
/// written positionally; `len` marks the valid prefix. Positions `[0, prompt_len)`
/// always hold the prompt.
#[derive(Debug, Clone)]
pub struct TokenBuffer {
    tokens: Vec<usize>,
    prompt_len: usize,
    len: usize,
}

impl TokenBuffer {
    pub fn new(prompt: &[usize], max_new_tokens: usize) -> GenerateResult<Self> {
        let capacity = prompt.len().checked_add(max_new_tokens).ok_or(
            GenerateError::LengthOverflow {
                prompt_len: prompt.len(),
                max_new_tokens,
            },
        )?;
        let mut tokens = vec![0; capacity];
        tokens[..prompt.len()].copy_from_slice(prompt);
        Ok(Self {
            tokens,
            prompt_len: prompt.len(),
            len: prompt.len(),
        })
    }

    pub fn prompt_len(&self) -> usize {
        self.prompt_len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_full(&self) -> bool {
        self.len == self.tokens.len()
    }

    /// Valid tokens written so far.
    pub fn as_slice(&self) -> &[usize] {
        &self.tokens[..self.len]
    }

    /// Tokens produced after the prompt.
    pub fn generated(&self) -> &[usize] {
        &self.tokens[self.prompt_len..self.len]
    }

    pub fn push(&mut self, token: usize) -> GenerateResult<()> {
        if self.is_full() {
            return Err(GenerateError::BufferFull {
                capacity: self.capacity(),
            });
        }
        self.tokens[self.len] = token;
        self.len += 1;
        Ok(())
    }

    /// The scorer input for the next step.
    pub fn window(&self, max_seq_length: usize, policy: WindowPolicy) -> &[usize] {
        let valid = self.as_slice();
        let crop = match policy {
            WindowPolicy::CurrentLength => valid.len() > max_seq_length,
            WindowPolicy::PromptLength => self.prompt_len > max_seq_length,
        };
        if crop {
            &valid[valid.len().saturating_sub(max_seq_length)..]
        } else {
            valid
        }
    }

    /// Hand the valid prefix to the caller.
    pub fn into_tokens(mut self) -> Vec<usize> {
        self.tokens.truncate(self.len);
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_preallocates_and_preserves_prompt() {
        let mut buf = TokenBuffer::new(&[5, 9, 2], 2).unwrap();
        assert_eq!(buf.capacity(), 5);
        assert_eq!(buf.as_slice(), &[5, 9, 2]);

        buf.push(7).unwrap();
        buf.push(8).unwrap();
        assert!(buf.is_full());
        assert_eq!(buf.generated(), &[7, 8]);
        assert!(matches!(
            buf.push(1),
            Err(GenerateError::BufferFull { capacity: 5 })
        ));
        assert_eq!(buf.into_tokens(), vec![5, 9, 2, 7, 8]);
    }

    #[test]
    fn into_tokens_drops_unwritten_slots() {
        let mut buf = TokenBuffer::new(&[1, 2], 10).unwrap();
        buf.push(3).unwrap();
        assert_eq!(buf.into_tokens(), vec![1, 2, 3]);
    }

    #[test]
    fn oversized_capacity_is_rejected() {
        let err = TokenBuffer::new(&[1, 2], usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::LengthOverflow {
                prompt_len: 2,
                max_new_tokens: usize::MAX
            }
        ));
    }

    #[test]
    fn current_length_window_crops_growing_sequence() {
        let mut buf = TokenBuffer::new(&[1, 2], 4).unwrap();
        assert_eq!(buf.window(3, WindowPolicy::CurrentLength), &[1, 2]);
        buf.push(3).unwrap();
        buf.push(4).unwrap();
        assert_eq!(buf.window(3, WindowPolicy::CurrentLength), &[2, 3, 4]);
    }

    #[test]
    fn prompt_length_window_only_crops_long_prompts() {
        let mut short = TokenBuffer::new(&[1, 2], 4).unwrap();
        short.push(3).unwrap();
        short.push(4).unwrap();
        assert_eq!(short.window(3, WindowPolicy::PromptLength), &[1, 2, 3, 4]);

        let long = TokenBuffer::new(&[1, 2, 3, 4, 5], 1).unwrap();
        assert_eq!(long.window(3, WindowPolicy::PromptLength), &[3, 4, 5]);
    }
}
