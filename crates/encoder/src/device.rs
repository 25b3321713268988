use candle_core::Device;
use serde::Deserialize;

/// Device the frozen encoder runs on.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DeviceConfig {
    #[serde(rename = "cpu")]
    #[default]
    Cpu,
    /// CUDA GPU with the given ordinal. Requires candle built with CUDA support.
    #[serde(rename = "cuda")]
    Cuda { ordinal: usize },
}

impl DeviceConfig {
    pub fn to_candle_device(&self) -> anyhow::Result<Device> {
        match self {
            DeviceConfig::Cpu => Ok(Device::Cpu),
            DeviceConfig::Cuda { ordinal } => Ok(Device::new_cuda(*ordinal)?),
        }
    }
}
