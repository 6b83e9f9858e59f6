use crate::error::MlResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Compute device a model is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    /// Accelerator when one is visible to the process, CPU otherwise.
    pub fn detect() -> Self {
        let visible = std::env::var("CUDA_VISIBLE_DEVICES").ok();
        Self::from_environment(visible.as_deref(), Path::new("/dev/nvidia0").exists())
    }

    fn from_environment(visible_devices: Option<&str>, device_node: bool) -> Self {
        let masked = matches!(visible_devices.map(str::trim), Some("") | Some("-1"));
        if device_node && visible_devices.is_some() && !masked {
            Self::Cuda
        } else {
            Self::Cpu
        }
    }

    /// Candle device for tensors; falls back to CPU when CUDA support is not
    /// compiled in.
    pub fn to_candle(self) -> MlResult<candle_core::Device> {
        match self {
            Self::Cuda => Ok(candle_core::Device::cuda_if_available(0)?),
            Self::Cpu => Ok(candle_core::Device::Cpu),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cuda => write!(f, "cuda"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}
