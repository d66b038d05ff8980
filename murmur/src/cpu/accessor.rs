//! Stride-aware row access for CPU kernels
//!
//! Kernels that map-reduce the trailing axis see a tensor as a sequence of
//! rows, one per combination of leading indices. [`RowGroups`] walks those
//! combinations and [`Row::get`] reads elements through the trailing
//! stride, so views produced by `narrow()` read correctly without a copy.

use bytemuck::Pod;

use crate::error::Result;
use crate::tensor::Tensor;

/// All rows of a tensor's trailing axis, leading indices flattened.
pub(crate) struct RowGroups<'a, T> {
    buf: &'a [T],
    base: usize,
    lead_shape: &'a [usize],
    lead_strides: &'a [usize],
    axis_len: usize,
    axis_stride: usize,
}

/// One row along the trailing axis.
pub(crate) struct Row<'a, T> {
    buf: &'a [T],
    base: usize,
    len: usize,
    stride: usize,
}

impl<'a, T: Pod> RowGroups<'a, T> {
    /// Build a row view over a host tensor of rank >= 1.
    pub(crate) fn new(tensor: &'a Tensor) -> Result<Self> {
        let buf = tensor.host_storage::<T>()?;
        let rank = tensor.rank();
        debug_assert!(rank >= 1, "row access requires rank >= 1");
        let shape = tensor.shape();
        let strides = tensor.strides();
        Ok(Self {
            buf,
            base: tensor.offset(),
            lead_shape: &shape[..rank - 1],
            lead_strides: &strides[..rank - 1],
            axis_len: shape[rank - 1],
            axis_stride: strides[rank - 1],
        })
    }

    /// Number of rows (product of the leading dimensions).
    pub(crate) fn num_rows(&self) -> usize {
        self.lead_shape.iter().product()
    }

    /// The `group`-th row, groups numbered in row-major order.
    pub(crate) fn row(&self, group: usize) -> Row<'a, T> {
        let mut base = self.base;
        let mut g = group;
        for d in (0..self.lead_shape.len()).rev() {
            base += (g % self.lead_shape[d]) * self.lead_strides[d];
            g /= self.lead_shape[d];
        }
        Row {
            buf: self.buf,
            base,
            len: self.axis_len,
            stride: self.axis_stride,
        }
    }
}

impl<T: Copy> Row<'_, T> {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn get(&self, i: usize) -> T {
        self.buf[self.base + i * self.stride]
    }
}
