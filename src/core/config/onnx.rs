//! ONNX Runtime session settings.

use super::Device;
use serde::{Deserialize, Serialize};

/// Graph optimization applied when a session is created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    Disable,
    Basic,
    Extended,
    #[default]
    All,
}

/// An ONNX Runtime execution provider.
///
/// Accelerated providers need the matching cargo feature (`cuda`,
/// `directml`, `coreml`); requesting one without it fails at session creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionProvider {
    Cpu,
    Cuda {
        device_id: i32,
        /// GPU arena limit in bytes.
        #[serde(default)]
        memory_limit: Option<usize>,
    },
    DirectMl {
        device_id: i32,
    },
    CoreMl {
        #[serde(default)]
        neural_engine_only: bool,
    },
}

/// Settings shared by every session the registry creates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrtSessionConfig {
    /// Threads used inside a single operator. `None` lets ONNX Runtime decide.
    pub intra_threads: Option<usize>,
    /// Threads used across independent operators.
    pub inter_threads: Option<usize>,
    pub optimization: OptimizationLevel,
    /// Providers in order of preference. Empty means CPU only.
    pub providers: Vec<ExecutionProvider>,
    /// ONNX Runtime log severity: 0 verbose up to 4 fatal.
    pub log_severity: u8,
}

impl Default for OrtSessionConfig {
    fn default() -> Self {
        Self {
            intra_threads: None,
            inter_threads: None,
            optimization: OptimizationLevel::All,
            providers: Vec::new(),
            log_severity: 3,
        }
    }
}

impl OrtSessionConfig {
    /// Sets both thread counts.
    pub fn with_threads(mut self, intra: usize, inter: usize) -> Self {
        self.intra_threads = Some(intra);
        self.inter_threads = Some(inter);
        self
    }

    pub fn with_optimization(mut self, level: OptimizationLevel) -> Self {
        self.optimization = level;
        self
    }

    /// Copy of this config with the providers replaced by those for `device`.
    pub fn for_device(&self, device: &Device) -> Self {
        let accelerated = match *device {
            Device::Cpu => None,
            Device::Cuda(device_id) => Some(ExecutionProvider::Cuda {
                device_id,
                memory_limit: None,
            }),
            Device::DirectMl => Some(ExecutionProvider::DirectMl { device_id: 0 }),
            Device::CoreMl => Some(ExecutionProvider::CoreMl {
                neural_engine_only: false,
            }),
        };
        Self {
            providers: accelerated
                .into_iter()
                .chain(std::iter::once(ExecutionProvider::Cpu))
                .collect(),
            ..self.clone()
        }
    }

    /// Configured providers, or CPU alone when none are set.
    pub fn providers(&self) -> Vec<ExecutionProvider> {
        if self.providers.is_empty() {
            vec![ExecutionProvider::Cpu]
        } else {
            self.providers.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_cpu_with_full_optimization() {
        let config = OrtSessionConfig::default();
        assert_eq!(config.providers(), vec![ExecutionProvider::Cpu]);
        assert_eq!(config.optimization, OptimizationLevel::All);
    }

    #[test]
    fn test_for_device_keeps_threads_and_falls_back_to_cpu() {
        let base = OrtSessionConfig::default().with_threads(2, 1);
        let cuda = base.for_device(&Device::Cuda(1));

        assert_eq!(cuda.intra_threads, Some(2));
        assert_eq!(
            cuda.providers(),
            vec![
                ExecutionProvider::Cuda {
                    device_id: 1,
                    memory_limit: None,
                },
                ExecutionProvider::Cpu,
            ]
        );
        assert_eq!(base.for_device(&Device::Cpu).providers(), vec![ExecutionProvider::Cpu]);
    }

    #[test]
    fn test_toml_providers() {
        let config: OrtSessionConfig = toml::from_str(
            r#"
            optimization = "basic"
            [[providers]]
            kind = "cuda"
            device_id = 0
            [[providers]]
            kind = "cpu"
            "#,
        )
        .unwrap();
        assert_eq!(config.optimization, OptimizationLevel::Basic);
        assert_eq!(config.providers().len(), 2);
        assert_eq!(config.log_severity, 3);
    }
}
