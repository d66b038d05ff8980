//! Model trait for generation
//!
//! Defines the contract the generation session requires from a loaded
//! model. Model loading, weight formats and the transformer operator set
//! live outside this workspace; the session only needs a forward step that
//! produces logits.

use crate::device::Device;
use crate::error::Result;
use crate::tensor::Tensor;

/// A loaded language model.
///
/// `forward_step` must be side-effect-free per call: many completions may
/// share one model from different threads, each re-submitting its own
/// token history. Any scratch state belongs to the caller, not the model.
pub trait LanguageModel: Send + Sync {
    /// Model name, e.g. "llama".
    fn name(&self) -> &str;

    /// The device this model's tensors live on.
    fn device(&self) -> Device;

    /// Number of entries in the vocabulary.
    fn vocab_size(&self) -> usize;

    /// Token ID that ends generation.
    fn eos_token_id(&self) -> u32;

    /// Maximum total sequence length (prompt + generated) the model
    /// supports; reaching it is a stop condition.
    fn max_context_len(&self) -> usize;

    /// Run one forward pass over the token history and return logits for
    /// the next position: a single row of `vocab_size` values on
    /// [`LanguageModel::device`].
    ///
    /// # Errors
    /// Returns an error if the forward pass fails.
    fn forward_step(&self, tokens: &[u32]) -> Result<Tensor>;
}
