//! Whitespace tokenizer over a fixed vocabulary

use std::collections::HashMap;

use murmur::{Error, Result, Tokenizer};

use crate::config::TinyLmConfig;

/// Splits text on whitespace and maps each word to its vocabulary index.
///
/// Vocabulary entries of the form `<name>` are control tokens: they decode
/// to empty text and are reachable through `control_token_id`. Regular
/// words decode with a leading space so that streamed chunks concatenate
/// into readable text.
pub struct TinyTokenizer {
    vocab: Vec<String>,
    index: HashMap<String, u32>,
}

impl TinyTokenizer {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(config: &TinyLmConfig) -> Self {
        let index = config
            .vocab
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i as u32))
            .collect();
        Self {
            vocab: config.vocab.clone(),
            index,
        }
    }

    fn is_control(word: &str) -> bool {
        word.starts_with('<') && word.ends_with('>')
    }
}

impl Tokenizer for TinyTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        text.split_whitespace()
            .map(|w| {
                self.index
                    .get(w)
                    .copied()
                    .ok_or_else(|| Error::Tokenizer(format!("word \"{w}\" is not in the vocab")))
            })
            .collect()
    }

    fn control_token_id(&self, name: &str) -> Result<u32> {
        match self.index.get(name) {
            Some(&id) if Self::is_control(name) => Ok(id),
            _ => Err(Error::Tokenizer(format!(
                "no control token named \"{name}\""
            ))),
        }
    }

    fn decode_token(&self, id: u32) -> Result<String> {
        let word = self
            .vocab
            .get(id as usize)
            .ok_or_else(|| Error::Tokenizer(format!("token {id} out of range")))?;
        if Self::is_control(word) {
            Ok(String::new())
        } else {
            Ok(format!(" {word}"))
        }
    }
}
