//! CPU kernels
//!
//! Reference implementations of the reduction and comparison kernels. All
//! reads go through the stride-aware row accessor, so non-contiguous views
//! work everywhere. These also serve as the ground truth the CUDA kernels
//! are verified against.

pub(crate) mod accessor;
pub(crate) mod all_close;
pub(crate) mod reduce;
