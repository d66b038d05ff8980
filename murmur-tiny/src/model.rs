//! Table-driven model

use std::path::Path;

use murmur::{Device, Error, LanguageModel, Result, Tensor};

use crate::config::TinyLmConfig;

/// A deterministic model serving next-token logits from a fixed table.
///
/// The row for the last token in the sequence is the distribution over the
/// next token. Rows are uploaded to the negotiated device at load time and
/// shared by every forward call, which keeps `forward_step` side-effect
/// free.
pub struct TinyLm {
    name: String,
    device: Device,
    eos: u32,
    max_ctx: usize,
    rows: Vec<Tensor>,
}

impl TinyLm {
    /// Load a model from a JSON config file.
    ///
    /// `device` may be `Auto`, which picks CUDA when the binary was built
    /// with the `cuda` feature and a device is reachable, and CPU
    /// otherwise.
    ///
    /// # Errors
    /// IO/JSON errors, `InvalidConfig` for an inconsistent table, and
    /// `NotImplemented` when CUDA is requested but compiled out.
    pub fn load(path: &Path, device: Device) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = TinyLmConfig::from_json(&text)?;
        Self::new(&config, device)
    }

    /// Build a model from an already-parsed config.
    ///
    /// # Errors
    /// Same as [`TinyLm::load`], minus the IO.
    pub fn new(config: &TinyLmConfig, device: Device) -> Result<Self> {
        config.validate()?;
        let vocab = config.vocab.len();

        #[cfg(feature = "cuda")]
        let (device, ctx) = negotiate(device)?;
        #[cfg(not(feature = "cuda"))]
        let device = negotiate(device)?;

        let mut rows = Vec::with_capacity(vocab);
        for row in &config.logits {
            let t = Tensor::from_f32(&[vocab], row);
            #[cfg(feature = "cuda")]
            let t = match &ctx {
                Some(c) => t.to_device(c)?,
                None => t,
            };
            rows.push(t);
        }

        Ok(Self {
            name: config.name.clone(),
            device,
            eos: config.eos_token_id,
            max_ctx: config.max_context_len,
            rows,
        })
    }
}

#[cfg(feature = "cuda")]
fn negotiate(requested: Device) -> Result<(Device, Option<murmur::cuda::CudaContext>)> {
    use murmur::cuda::CudaContext;
    match requested {
        Device::Cpu => Ok((Device::Cpu, None)),
        Device::Cuda => {
            let ctx = CudaContext::new(0)?;
            Ok((Device::Cuda, Some(ctx)))
        }
        Device::Auto => match CudaContext::new(0) {
            Ok(ctx) => Ok((Device::Cuda, Some(ctx))),
            Err(_) => Ok((Device::Cpu, None)),
        },
    }
}

#[cfg(not(feature = "cuda"))]
fn negotiate(requested: Device) -> Result<Device> {
    match requested {
        Device::Cpu | Device::Auto => Ok(Device::Cpu),
        Device::Cuda => Err(Error::NotImplemented(
            "murmur was built without cuda support".to_string(),
        )),
    }
}

impl LanguageModel for TinyLm {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Device {
        self.device
    }

    fn vocab_size(&self) -> usize {
        self.rows.len()
    }

    fn eos_token_id(&self) -> u32 {
        self.eos
    }

    fn max_context_len(&self) -> usize {
        self.max_ctx
    }

    fn forward_step(&self, tokens: &[u32]) -> Result<Tensor> {
        let last = *tokens
            .last()
            .ok_or_else(|| Error::Boundary("cannot step an empty token sequence".to_string()))?;
        let row = self.rows.get(last as usize).ok_or_else(|| {
            Error::Boundary(format!(
                "token {last} out of range for vocab of {}",
                self.rows.len()
            ))
        })?;
        Ok(row.clone())
    }
}
