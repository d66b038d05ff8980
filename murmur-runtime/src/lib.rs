//! Murmur runtime: streaming text generation
//!
//! A [`Session`] shares a loaded model and tokenizer; a [`Prompt`] collects
//! the input tokens; a [`Completion`] pulls one [`Chunk`] of decoded text
//! per generation step.
//!
//! ```text
//! Session          ← owns Arc<dyn LanguageModel> + Arc<dyn Tokenizer>
//!   └── Prompt     ← token sequence, mutable until a completion starts
//!   └── Completion ← one generation run: state machine + RNG + workspace
//!         └── Chunk ← one unit of decoded text per next_chunk() pull
//! ```

mod session;
mod stats;

pub use session::{Chunk, Completion, Prompt, Session};
pub use stats::TokenRateReport;
