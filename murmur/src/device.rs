//! Compute devices

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Where a tensor lives and where kernels run.
///
/// `Auto` is only meaningful as a *request* when loading a model: the loader
/// negotiates it down to `Cuda` when the binary was built with the `cuda`
/// feature and a device is present, otherwise `Cpu`. Tensors always carry a
/// concrete device tag; no kernel accepts `Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Cuda,
    Auto,
}

impl Device {
    /// Whether this is a concrete device a tensor can live on.
    #[must_use]
    pub const fn is_concrete(self) -> bool {
        !matches!(self, Self::Auto)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "auto" => Ok(Self::Auto),
            other => Err(Error::InvalidConfig(format!(
                "unknown device \"{other}\" (expected cpu, cuda or auto)"
            ))),
        }
    }
}
