//! Whitespace word-level tokenizer.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
pub const EOS_TOKEN: &str = "<eos>";

const BUILTIN_WORDS: &[&str] = &[
    "the", "a", "is", "in", "to", "of", "and", "for", "on", "with", "as", "at", "by", "from",
    "it", "this", "that", "are", "was", "be", "have", "has", "had", "not", "can", "will",
    "would", "could", "should", "said", "there", "their", "they", "we", "you", "he", "she",
    "i", "my", "your", "our", "but", "or", "so", "if", "then", "when", "where", "what", "how",
    "why", "who", "which", "do", "does", "did", "go", "come", "see", "get", "make", "know",
    "think", "take", "want", "use", "find", "give", "tell", "work", "call", "try", "ask",
    "need", "feel", "become", "leave", "put", "hello", "name", "day", "time", "world",
];

pub struct WordTokenizer {
    vocab: HashMap<String, usize>,
    reverse_vocab: HashMap<usize, String>,
    unk_id: usize,
    eos_id: usize,
}

impl WordTokenizer {
    /// Reserved tokens followed by a small builtin word list, capped at `vocab_size`.
    pub fn builtin(vocab_size: usize) -> Self {
        let words = [PAD_TOKEN, UNK_TOKEN, EOS_TOKEN]
            .into_iter()
            .chain(BUILTIN_WORDS.iter().copied())
            .take(vocab_size)
            .enumerate()
            .map(|(id, word)| (word.to_string(), id))
            .collect();
        Self::from_map(words).unwrap_or_else(|_| Self::reserved_only())
    }

    fn reserved_only() -> Self {
        let words = [PAD_TOKEN, UNK_TOKEN, EOS_TOKEN]
            .iter()
            .enumerate()
            .map(|(id, word)| (word.to_string(), id))
            .collect::<HashMap<_, _>>();
        let reverse_vocab = words.iter().map(|(w, &id)| (id, w.clone())).collect();
        Self {
            vocab: words,
            reverse_vocab,
            unk_id: 1,
            eos_id: 2,
        }
    }

    /// Load a `{"word": id, ...}` JSON map. It must contain `<unk>` and `<eos>`.
    pub fn from_vocab_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let blob = fs::read_to_string(path)
            .with_context(|| format!("failed to read vocabulary {}", path.display()))?;
        let vocab: HashMap<String, usize> = serde_json::from_str(&blob)
            .with_context(|| format!("failed to parse vocabulary {}", path.display()))?;
        Self::from_map(vocab)
    }

    pub fn from_map(vocab: HashMap<String, usize>) -> Result<Self> {
        let unk_id = *vocab
            .get(UNK_TOKEN)
            .with_context(|| format!("vocabulary has no {} entry", UNK_TOKEN))?;
        let eos_id = *vocab
            .get(EOS_TOKEN)
            .with_context(|| format!("vocabulary has no {} entry", EOS_TOKEN))?;
        let reverse_vocab = vocab.iter().map(|(w, &id)| (id, w.clone())).collect();
        Ok(Self {
            vocab,
            reverse_vocab,
            unk_id,
            eos_id,
        })
    }

    pub fn vocab(&self) -> &HashMap<String, usize> {
        &self.vocab
    }

    pub fn eos_id(&self) -> usize {
        self.eos_id
    }

    /// Largest id plus one.
    pub fn vocab_size(&self) -> usize {
        self.reverse_vocab.keys().max().map_or(0, |max| max + 1)
    }

    pub fn encode(&self, text: &str) -> Vec<usize> {
        text.split_whitespace()
            .map(|word| {
                self.vocab
                    .get(&word.to_lowercase())
                    .copied()
                    .unwrap_or(self.unk_id)
            })
            .collect()
    }

    pub fn decode(&self, ids: &[usize]) -> String {
        ids.iter()
            .filter_map(|id| self.reverse_vocab.get(id))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_encode_decode() {
        let tok = WordTokenizer::builtin(1000);
        let ids = tok.encode("Hello my name is zebra");
        assert_eq!(ids.len(), 5);
        assert_eq!(ids[4], 1);
        assert_eq!(tok.decode(&ids), "hello my name is <unk>");
        assert_eq!(tok.eos_id(), 2);
    }

    #[test]
    fn builtin_respects_vocab_size() {
        let tok = WordTokenizer::builtin(10);
        assert_eq!(tok.vocab_size(), 10);
        assert!(tok.encode("world").iter().all(|&id| id == 1));
    }

    #[test]
    fn blank_text_encodes_to_nothing() {
        assert!(WordTokenizer::builtin(100).encode("   ").is_empty());
    }

    #[test]
    fn loads_vocab_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"<unk>": 0, "<eos>": 1, "cat": 2, "sat": 3}}"#).unwrap();
        let tok = WordTokenizer::from_vocab_file(file.path()).unwrap();
        assert_eq!(tok.encode("cat sat dog"), vec![2, 3, 0]);
        assert_eq!(tok.eos_id(), 1);
        assert_eq!(tok.vocab_size(), 4);
    }

    #[test]
    fn vocab_without_eos_is_rejected() {
        let vocab = HashMap::from([("<unk>".to_string(), 0)]);
        assert!(WordTokenizer::from_map(vocab).is_err());
    }
}
