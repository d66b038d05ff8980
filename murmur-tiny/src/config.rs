//! Model configuration parsing

use serde::Deserialize;

use murmur::{Error, Result};

/// JSON description of a table model.
///
/// `logits[t]` is the next-token score row served when `t` was the last
/// token of the sequence. Rows must be square with the vocabulary.
#[derive(Debug, Clone, Deserialize)]
pub struct TinyLmConfig {
    pub name: String,
    pub vocab: Vec<String>,
    pub eos_token_id: u32,
    pub max_context_len: usize,
    /// Control token prepended to prompts by the CLI, if any.
    #[serde(default)]
    pub bos_token: Option<String>,
    pub logits: Vec<Vec<f32>>,
}

impl TinyLmConfig {
    /// Parse a config from JSON and validate it.
    ///
    /// # Errors
    /// Returns a JSON error for malformed input and `InvalidConfig` for an
    /// inconsistent table.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the inconsistency.
    pub fn validate(&self) -> Result<()> {
        let vocab = self.vocab.len();
        if vocab == 0 {
            return Err(Error::InvalidConfig("vocab must not be empty".to_string()));
        }
        if (self.eos_token_id as usize) >= vocab {
            return Err(Error::InvalidConfig(format!(
                "eos_token_id {} out of range for vocab of {vocab}",
                self.eos_token_id
            )));
        }
        if self.max_context_len == 0 {
            return Err(Error::InvalidConfig(
                "max_context_len must be >= 1".to_string(),
            ));
        }
        if self.logits.len() != vocab {
            return Err(Error::InvalidConfig(format!(
                "logit table has {} rows for a vocab of {vocab}",
                self.logits.len()
            )));
        }
        for (i, row) in self.logits.iter().enumerate() {
            if row.len() != vocab {
                return Err(Error::InvalidConfig(format!(
                    "logit row {i} has {} entries for a vocab of {vocab}",
                    row.len()
                )));
            }
        }
        if let Some(bos) = &self.bos_token {
            if !self.vocab.iter().any(|w| w == bos) {
                return Err(Error::InvalidConfig(format!(
                    "bos_token \"{bos}\" is not in the vocab"
                )));
            }
        }
        Ok(())
    }
}
