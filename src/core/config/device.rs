//! Compute device selection.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device a detector session runs on.
///
/// Parsed from `cpu`, `cuda`, `cuda:N`, `directml`, `coreml` (case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    /// CUDA with the given device ordinal.
    Cuda(i32),
    DirectMl,
    CoreMl,
}

impl Device {
    /// Whether the matching execution provider was compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Device::Cpu => true,
            Device::Cuda(_) => cfg!(feature = "cuda"),
            Device::DirectMl => cfg!(feature = "directml"),
            Device::CoreMl => cfg!(feature = "coreml"),
        }
    }

    /// Errors with [`ConfigError::UnsupportedDevice`] when the device is not compiled in.
    pub fn ensure_available(&self) -> Result<(), ConfigError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedDevice {
                device: format!("{self} (enable the matching cargo feature)"),
            })
        }
    }
}

impl FromStr for Device {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            "directml" | "dml" => Ok(Device::DirectMl),
            "coreml" | "mps" => Ok(Device::CoreMl),
            other => {
                if let Some(id) = other.strip_prefix("cuda:") {
                    id.parse::<i32>()
                        .map(Device::Cuda)
                        .map_err(|_| ConfigError::UnsupportedDevice {
                            device: s.to_string(),
                        })
                } else {
                    Err(ConfigError::UnsupportedDevice {
                        device: s.to_string(),
                    })
                }
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{id}"),
            Device::DirectMl => write!(f, "directml"),
            Device::CoreMl => write!(f, "coreml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parse() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:2".parse::<Device>().unwrap(), Device::Cuda(2));
        assert!("cuda:x".parse::<Device>().is_err());
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_cpu_always_available() {
        assert!(Device::Cpu.ensure_available().is_ok());
    }

    #[test]
    fn test_device_display_round_trips_through_parse() {
        let device = Device::Cuda(3);
        assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
    }
}
