//! Tokenizer trait
//!
//! The session treats tokenization as opaque: text becomes token IDs when
//! building a prompt, and each generated token becomes a piece of text
//! when a chunk is emitted.

use crate::error::Result;

/// Converts between text and token IDs.
pub trait Tokenizer: Send + Sync {
    /// Encode text to token IDs.
    ///
    /// # Errors
    /// Returns an error if the text cannot be encoded.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Look up a control token (e.g. a begin-of-turn marker) by name.
    ///
    /// # Errors
    /// Returns an error if no control token has that name.
    fn control_token_id(&self, name: &str) -> Result<u32>;

    /// Decode a single token ID to text.
    ///
    /// # Errors
    /// Returns an error if the ID is out of range.
    fn decode_token(&self, id: u32) -> Result<String>;
}
