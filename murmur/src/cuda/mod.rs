//! CUDA backend
//!
//! Device context management, reference-counted device buffers and the
//! CUDA reduction kernels. Only compiled with the `cuda` feature.

pub mod context;
pub mod ops;
pub mod storage;

pub use context::CudaContext;
pub use storage::CudaStorage;
