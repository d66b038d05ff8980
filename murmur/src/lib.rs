//! Murmur: core numeric kernels for a local LLM inference runtime
//!
//! This crate provides the device-abstracted tensor layer used by the
//! generation runtime: reduction kernels over the trailing axis (sum,
//! sum-of-squares, sum-of-exp, max), the approximate-equality comparison
//! used to verify kernel ports across devices, and the sampling math that
//! turns a row of logits into a token.
//!
//! The CPU kernels are always available; CUDA kernels live behind the
//! `cuda` feature. Kernel selection happens per call in [`dispatch`] based
//! on the tensor's device and dtype, and unsupported combinations fail
//! loudly instead of falling back.

mod cpu;
pub mod device;
pub mod dispatch;
pub mod dtype;
pub mod error;
pub mod model;
pub mod reduce;
pub mod sampling;
pub mod tensor;
pub mod tokenizer;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use device::Device;
pub use dispatch::{all_close, reduce};
pub use dtype::DType;
pub use error::{Error, Result};
pub use model::LanguageModel;
pub use reduce::ReduceOp;
pub use sampling::{CompletionConfig, SampleWorkspace};
pub use tensor::Tensor;
pub use tokenizer::Tokenizer;
