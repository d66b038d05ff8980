//! Error types for murmur
//!
//! Every fallible call in this workspace returns [`Result`]; errors are
//! values, not process-wide state. A last-error slot is still kept as an
//! additive diagnostic (see [`record`] / [`last_error_message`]) so that a
//! boundary layer can expose "what went wrong most recently" without it
//! ever being the only reporting path.

use std::sync::Mutex;

use thiserror::Error;

/// Result type alias using murmur's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for murmur operations
#[derive(Error, Debug)]
pub enum Error {
    /// Shape or rank precondition violated. Checked before any compute.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Two tensors that must agree in shape do not.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Unsupported (operation, device, dtype) combination. Never a fallback.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Sampling parameters out of range.
    #[error("invalid completion config: {0}")]
    InvalidConfig(String),

    /// An external collaborator (model forward pass, loader) failed.
    #[error("boundary call failed: {0}")]
    Boundary(String),

    /// A state-machine method was called in the wrong state.
    #[error("usage error: {0}")]
    Usage(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    Cuda(String),
}

#[cfg(feature = "cuda")]
impl From<cudarc::driver::DriverError> for Error {
    fn from(e: cudarc::driver::DriverError) -> Self {
        Self::Cuda(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Additive diagnostic slot (most recent error, process-wide)
// ---------------------------------------------------------------------------

static LAST_ERROR: Mutex<Option<String>> = Mutex::new(None);

/// Record an error in the process-wide diagnostic slot.
///
/// Overwrites the previous entry; the slot holds only the most recent
/// message. Callers still receive the error as a value; this exists for
/// diagnostics only.
pub fn record(err: &Error) {
    *LAST_ERROR.lock().unwrap() = Some(err.to_string());
}

/// The most recently recorded error message, if any.
#[must_use]
pub fn last_error_message() -> Option<String> {
    LAST_ERROR.lock().unwrap().clone()
}

/// Take the most recently recorded error message, clearing the slot.
#[must_use]
pub fn take_last_error() -> Option<String> {
    LAST_ERROR.lock().unwrap().take()
}
