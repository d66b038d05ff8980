//! CUDA kernel entry points

mod reduce;

pub use reduce::{reduce, reduce3d};
