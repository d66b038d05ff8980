//! Reference-counted device buffers

use std::sync::Arc;

use cudarc::driver::{CudaSlice, CudaView, DeviceSlice};

use crate::cuda::CudaContext;
use crate::error::{Error, Result};

/// An untyped GPU allocation shared by all tensor views derived from it.
///
/// The allocation is freed when the last view drops. Element typing lives
/// on the tensor (dtype + strides); kernels receive raw device pointers.
#[derive(Clone)]
pub struct CudaStorage {
    buf: Arc<CudaSlice<u8>>,
    ctx: CudaContext,
}

impl CudaStorage {
    /// Upload host bytes to the device.
    ///
    /// # Errors
    /// Returns an error if allocation or the copy fails.
    pub(crate) fn from_bytes(ctx: &CudaContext, bytes: &[u8]) -> Result<Self> {
        let buf = ctx.device().htod_sync_copy(bytes)?;
        Ok(Self::wrap(ctx, buf))
    }

    /// Take ownership of an existing device allocation.
    pub(crate) fn wrap(ctx: &CudaContext, buf: CudaSlice<u8>) -> Self {
        Self {
            buf: Arc::new(buf),
            ctx: ctx.clone(),
        }
    }

    /// Size of the allocation in bytes.
    pub(crate) fn byte_len(&self) -> usize {
        self.buf.len()
    }

    /// Copy `len` bytes starting at `start` back to the host.
    ///
    /// # Errors
    /// Returns an error if the range is out of bounds or the copy fails.
    pub(crate) fn read_bytes(&self, start: usize, len: usize) -> Result<Vec<u8>> {
        if start + len > self.buf.len() {
            return Err(Error::InvalidShape(format!(
                "device read of {len} bytes at offset {start} out of bounds ({} allocated)",
                self.buf.len()
            )));
        }
        let view = self.buf.slice(start..start + len);
        Ok(self.ctx.device().dtoh_sync_copy(&view)?)
    }

    /// A device view starting `start` bytes into the allocation, for
    /// passing to kernel launches.
    pub(crate) fn byte_view(&self, start: usize) -> CudaView<'_, u8> {
        self.buf.slice(start..)
    }

    /// The context this allocation belongs to.
    #[must_use]
    pub fn context(&self) -> &CudaContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let ctx = CudaContext::new(0).expect("Failed to create CUDA context");
        let bytes: Vec<u8> = (0..64).collect();
        let storage = CudaStorage::from_bytes(&ctx, &bytes).unwrap();
        assert_eq!(storage.byte_len(), 64);
        assert_eq!(storage.read_bytes(0, 64).unwrap(), bytes);
        assert_eq!(storage.read_bytes(16, 4).unwrap(), vec![16, 17, 18, 19]);
    }

    #[test]
    fn test_out_of_bounds_read() {
        let ctx = CudaContext::new(0).expect("Failed to create CUDA context");
        let storage = CudaStorage::from_bytes(&ctx, &[0u8; 8]).unwrap();
        assert!(storage.read_bytes(4, 8).is_err());
    }
}
