//! CUDA context management

use std::sync::Arc;

use cudarc::driver::CudaDevice;

use crate::error::Result;

/// Manages a CUDA device handle.
///
/// Cloning is cheap; all clones reference the same device.
#[derive(Clone)]
pub struct CudaContext {
    device: Arc<CudaDevice>,
}

impl CudaContext {
    /// Create a new CUDA context for the specified device ordinal.
    ///
    /// # Errors
    /// Returns an error if CUDA device initialization fails.
    pub fn new(ordinal: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal)?;
        Ok(Self { device })
    }

    /// Get a reference to the underlying CUDA device.
    #[must_use]
    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    /// Wait for all queued device operations to complete.
    ///
    /// # Errors
    /// Returns an error if synchronization fails.
    pub fn synchronize(&self) -> Result<()> {
        self.device.synchronize()?;
        Ok(())
    }
}
