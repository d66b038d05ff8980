//! Device-tagged tensor views
//!
//! A [`Tensor`] is a shape/stride/dtype-typed view over a reference-counted
//! buffer. Views derived from the same buffer (via [`Tensor::reshape`],
//! [`Tensor::slice_view`] or [`Tensor::narrow`]) share storage; the buffer
//! is freed when the last view is dropped. Host storage is plain bytes
//! behind an `Arc`; CUDA storage (behind the `cuda` feature) is a
//! reference-counted device allocation.
//!
//! `narrow()` on a non-leading dimension produces a non-contiguous view.
//! Kernels must read through [`Tensor::strides`]; none may assume
//! contiguity.

use std::sync::Arc;

use bytemuck::Pod;
use half::{bf16, f16};

use crate::device::Device;
use crate::dtype::DType;
use crate::error::{Error, Result};

#[derive(Clone)]
enum Storage {
    Host(Arc<Vec<u8>>),
    #[cfg(feature = "cuda")]
    Cuda(crate::cuda::CudaStorage),
}

/// A non-owning-style view over shared tensor storage.
///
/// Cloning is cheap: views share the underlying buffer.
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    /// Offset from the start of the storage, in elements.
    offset: usize,
    shape: Vec<usize>,
    /// Per-dimension strides, in elements.
    strides: Vec<usize>,
    dtype: DType,
}

fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

impl Tensor {
    fn from_host_bytes(shape: &[usize], dtype: DType, bytes: Vec<u8>) -> Self {
        Self {
            storage: Storage::Host(Arc::new(bytes)),
            offset: 0,
            strides: contiguous_strides(shape),
            shape: shape.to_vec(),
            dtype,
        }
    }

    /// Create a host tensor from an f32 slice.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the shape's element count.
    #[must_use]
    pub fn from_f32(shape: &[usize], data: &[f32]) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "data len {} != shape product {numel}",
            data.len()
        );
        Self::from_host_bytes(shape, DType::F32, bytemuck::cast_slice(data).to_vec())
    }

    /// Create a host tensor from an f16 slice.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the shape's element count.
    #[must_use]
    pub fn from_f16(shape: &[usize], data: &[f16]) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(data.len(), numel);
        Self::from_host_bytes(shape, DType::F16, bytemuck::cast_slice(data).to_vec())
    }

    /// Create a host tensor from a bf16 slice.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the shape's element count.
    #[must_use]
    pub fn from_bf16(shape: &[usize], data: &[bf16]) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(data.len(), numel);
        Self::from_host_bytes(shape, DType::BF16, bytemuck::cast_slice(data).to_vec())
    }

    /// Create a host tensor from a u32 slice.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the shape's element count.
    #[must_use]
    pub fn from_u32(shape: &[usize], data: &[u32]) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(data.len(), numel);
        Self::from_host_bytes(shape, DType::U32, bytemuck::cast_slice(data).to_vec())
    }

    /// Create a host tensor from raw bytes with a given dtype.
    ///
    /// # Panics
    /// Panics if the byte length does not match the shape's element count.
    #[must_use]
    pub fn from_raw(shape: &[usize], dtype: DType, bytes: Vec<u8>) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(bytes.len(), numel * dtype.size_in_bytes());
        Self::from_host_bytes(shape, dtype, bytes)
    }

    /// The shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Size of dimension `dim`.
    ///
    /// # Errors
    /// Returns `InvalidShape` if `dim` is out of range.
    pub fn dim(&self, dim: usize) -> Result<usize> {
        self.shape.get(dim).copied().ok_or_else(|| {
            Error::InvalidShape(format!(
                "dimension {dim} out of range for rank {}",
                self.shape.len()
            ))
        })
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements in the view.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Element count along the trailing (reduction) axis.
    #[must_use]
    pub fn axis_len(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Per-dimension strides, in elements.
    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// The element data type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// The device this view's storage lives on.
    #[must_use]
    pub fn device(&self) -> Device {
        match &self.storage {
            Storage::Host(_) => Device::Cpu,
            #[cfg(feature = "cuda")]
            Storage::Cuda(_) => Device::Cuda,
        }
    }

    /// Whether the view is laid out contiguously in memory.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.strides == contiguous_strides(&self.shape)
    }

    /// Assert exact shape equality with another tensor.
    ///
    /// Binary kernels call this before any compute; there is no silent
    /// broadcast.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the shapes differ.
    pub fn check_shape_eq(&self, other: &Tensor) -> Result<()> {
        if self.shape == other.shape {
            Ok(())
        } else {
            Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                got: other.shape.clone(),
            })
        }
    }

    /// Check the broadcast precondition for binary operations that document
    /// broadcasting: shapes must be equal, or the higher-rank shape must end
    /// with the lower-rank shape (the missing leading dimensions are treated
    /// as broadcast groups).
    ///
    /// # Errors
    /// Returns `ShapeMismatch` for equal-rank disagreement and
    /// `InvalidShape` when the trailing dimensions disagree.
    pub fn check_broadcastable(&self, other: &Tensor) -> Result<()> {
        if self.rank() == other.rank() {
            return self.check_shape_eq(other);
        }
        let (long, short) = if self.rank() > other.rank() {
            (self, other)
        } else {
            (other, self)
        };
        let tail = &long.shape[long.rank() - short.rank()..];
        if tail == short.shape.as_slice() {
            Ok(())
        } else {
            Err(Error::InvalidShape(format!(
                "shape {:?} does not broadcast over {:?}",
                short.shape, long.shape
            )))
        }
    }

    /// Create a view with a different shape over the same elements.
    ///
    /// # Errors
    /// Returns `InvalidShape` if the view is non-contiguous or the element
    /// counts disagree.
    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor> {
        if !self.is_contiguous() {
            return Err(Error::InvalidShape(
                "reshape requires a contiguous view".to_string(),
            ));
        }
        let new_numel: usize = shape.iter().product();
        if new_numel != self.numel() {
            return Err(Error::InvalidShape(format!(
                "cannot reshape {:?} ({} elements) to {shape:?} ({new_numel} elements)",
                self.shape,
                self.numel()
            )));
        }
        Ok(Self {
            storage: self.storage.clone(),
            offset: self.offset,
            strides: contiguous_strides(shape),
            shape: shape.to_vec(),
            dtype: self.dtype,
        })
    }

    /// Zero-copy sub-slice view starting `offset` elements into this view,
    /// with the given shape.
    ///
    /// # Errors
    /// Returns `InvalidShape` if the view is non-contiguous or the slice
    /// extends past the backing storage.
    pub fn slice_view(&self, offset: usize, shape: &[usize]) -> Result<Tensor> {
        if !self.is_contiguous() {
            return Err(Error::InvalidShape(
                "slice_view requires a contiguous view".to_string(),
            ));
        }
        let new_numel: usize = shape.iter().product();
        if self.offset + offset + new_numel > self.storage_len() {
            return Err(Error::InvalidShape(format!(
                "slice_view of {new_numel} elements at offset {offset} is out of bounds"
            )));
        }
        Ok(Self {
            storage: self.storage.clone(),
            offset: self.offset + offset,
            strides: contiguous_strides(shape),
            shape: shape.to_vec(),
            dtype: self.dtype,
        })
    }

    /// View a sub-range `[start, start + len)` of dimension `dim`, keeping
    /// all other dimensions. Narrowing any dimension but the leading one
    /// yields a non-contiguous view.
    ///
    /// # Errors
    /// Returns `InvalidShape` if `dim` or the range is out of bounds.
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Tensor> {
        let dim_size = self.dim(dim)?;
        if start + len > dim_size {
            return Err(Error::InvalidShape(format!(
                "narrow range {start}..{} out of bounds for dimension {dim} of size {dim_size}",
                start + len
            )));
        }
        let mut shape = self.shape.clone();
        shape[dim] = len;
        Ok(Self {
            storage: self.storage.clone(),
            offset: self.offset + start * self.strides[dim],
            strides: self.strides.clone(),
            shape,
            dtype: self.dtype,
        })
    }

    /// Total element capacity of the backing storage.
    fn storage_len(&self) -> usize {
        let bytes = match &self.storage {
            Storage::Host(buf) => buf.len(),
            #[cfg(feature = "cuda")]
            Storage::Cuda(s) => s.byte_len(),
        };
        bytes / self.dtype.size_in_bytes()
    }

    /// Offset of this view into the storage, in elements.
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    /// The full backing storage viewed as a typed slice (host only).
    ///
    /// The slice starts at the storage origin, not at this view's offset;
    /// accessors add [`Tensor::offset`] themselves.
    pub(crate) fn host_storage<T: Pod>(&self) -> Result<&[T]> {
        match &self.storage {
            Storage::Host(buf) => Ok(bytemuck::cast_slice(buf.as_slice())),
            #[cfg(feature = "cuda")]
            Storage::Cuda(_) => Err(Error::NotImplemented(
                "host access to a cuda tensor".to_string(),
            )),
        }
    }

    /// Read the view's elements out as f32, in row-major order, honouring
    /// strides. CUDA tensors are copied to the host first.
    ///
    /// # Errors
    /// Returns `NotImplemented` for non-float dtypes and `InvalidShape` for
    /// non-contiguous CUDA views.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        match &self.storage {
            Storage::Host(_) => match self.dtype {
                DType::F32 => self.gather_to_f32::<f32>(|v| v),
                DType::F16 => self.gather_to_f32::<f16>(f16::to_f32),
                DType::BF16 => self.gather_to_f32::<bf16>(bf16::to_f32),
                DType::U32 => Err(Error::NotImplemented(
                    "to_f32_vec is not implemented for u32".to_string(),
                )),
            },
            #[cfg(feature = "cuda")]
            Storage::Cuda(_) => self.to_host()?.to_f32_vec(),
        }
    }

    fn gather_to_f32<T: Pod>(&self, convert: impl Fn(T) -> f32) -> Result<Vec<f32>> {
        let buf: &[T] = self.host_storage()?;
        if self.numel() == 0 {
            return Ok(Vec::new());
        }
        let rank = self.rank();
        if rank == 0 {
            return Ok(vec![convert(buf[self.offset])]);
        }
        let mut out = Vec::with_capacity(self.numel());
        let mut idx = vec![0usize; rank];
        loop {
            let mut off = self.offset;
            for (i, s) in idx.iter().zip(&self.strides) {
                off += i * s;
            }
            out.push(convert(buf[off]));

            let mut d = rank;
            loop {
                if d == 0 {
                    return Ok(out);
                }
                d -= 1;
                idx[d] += 1;
                if idx[d] < self.shape[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
    }
}

#[cfg(feature = "cuda")]
impl Tensor {
    /// Wrap a contiguous CUDA allocation as a tensor.
    pub(crate) fn from_cuda(
        storage: crate::cuda::CudaStorage,
        shape: &[usize],
        dtype: DType,
    ) -> Self {
        Self {
            storage: Storage::Cuda(storage),
            offset: 0,
            strides: contiguous_strides(shape),
            shape: shape.to_vec(),
            dtype,
        }
    }

    /// Copy this tensor to a CUDA device. A no-op for tensors already there.
    ///
    /// # Errors
    /// Returns `InvalidShape` for non-contiguous views, or a CUDA error if
    /// the transfer fails.
    pub fn to_device(&self, ctx: &crate::cuda::CudaContext) -> Result<Tensor> {
        match &self.storage {
            Storage::Cuda(_) => Ok(self.clone()),
            Storage::Host(buf) => {
                if !self.is_contiguous() {
                    return Err(Error::InvalidShape(
                        "to_device requires a contiguous view".to_string(),
                    ));
                }
                let elem = self.dtype.size_in_bytes();
                let start = self.offset * elem;
                let end = start + self.numel() * elem;
                let storage = crate::cuda::CudaStorage::from_bytes(ctx, &buf[start..end])?;
                Ok(Self::from_cuda(storage, &self.shape, self.dtype))
            }
        }
    }

    /// Copy this tensor to the host. A no-op for host tensors.
    ///
    /// # Errors
    /// Returns `InvalidShape` for non-contiguous views, or a CUDA error if
    /// the transfer fails.
    pub fn to_host(&self) -> Result<Tensor> {
        match &self.storage {
            Storage::Host(_) => Ok(self.clone()),
            Storage::Cuda(s) => {
                if !self.is_contiguous() {
                    return Err(Error::InvalidShape(
                        "to_host requires a contiguous view".to_string(),
                    ));
                }
                let elem = self.dtype.size_in_bytes();
                let bytes = s.read_bytes(self.offset * elem, self.numel() * elem)?;
                Ok(Self::from_host_bytes(&self.shape, self.dtype, bytes))
            }
        }
    }

    /// The CUDA storage backing this view.
    ///
    /// # Errors
    /// Returns `NotImplemented` for host tensors.
    pub(crate) fn cuda_storage(&self) -> Result<&crate::cuda::CudaStorage> {
        match &self.storage {
            Storage::Cuda(s) => Ok(s),
            Storage::Host(_) => Err(Error::NotImplemented(
                "device access to a host tensor".to_string(),
            )),
        }
    }
}
