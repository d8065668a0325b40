//! Maps [`OrtSessionConfig`] onto an ONNX Runtime session builder.

use crate::core::config::{ExecutionProvider, OptimizationLevel, OrtSessionConfig};
use ort::execution_providers::ExecutionProviderDispatch;
use ort::logging::LogLevel;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};

pub(super) fn configure(
    mut builder: SessionBuilder,
    cfg: &OrtSessionConfig,
) -> Result<SessionBuilder, ort::Error> {
    if let Some(n) = cfg.intra_threads {
        builder = builder.with_intra_threads(n)?;
    }
    if let Some(n) = cfg.inter_threads {
        builder = builder.with_inter_threads(n)?;
    }
    builder = builder
        .with_optimization_level(optimization(cfg.optimization))?
        .with_log_level(log_level(cfg.log_severity))?;

    let providers = cfg
        .providers()
        .iter()
        .map(dispatch)
        .collect::<Result<Vec<_>, _>>()?;
    builder.with_execution_providers(providers)
}

fn optimization(level: OptimizationLevel) -> GraphOptimizationLevel {
    match level {
        OptimizationLevel::Disable => GraphOptimizationLevel::Disable,
        OptimizationLevel::Basic => GraphOptimizationLevel::Level1,
        OptimizationLevel::Extended => GraphOptimizationLevel::Level2,
        OptimizationLevel::All => GraphOptimizationLevel::Level3,
    }
}

fn log_level(severity: u8) -> LogLevel {
    match severity {
        0 => LogLevel::Verbose,
        1 => LogLevel::Info,
        2 => LogLevel::Warning,
        3 => LogLevel::Error,
        _ => LogLevel::Fatal,
    }
}

#[allow(unused_variables)]
fn dispatch(provider: &ExecutionProvider) -> Result<ExecutionProviderDispatch, ort::Error> {
    use ort::execution_providers as ep;

    match provider {
        ExecutionProvider::Cpu => Ok(ep::CPUExecutionProvider::default().build()),
        ExecutionProvider::Cuda {
            device_id,
            memory_limit,
        } => {
            #[cfg(feature = "cuda")]
            {
                let mut cuda = ep::CUDAExecutionProvider::default().with_device_id(*device_id);
                if let Some(limit) = memory_limit {
                    cuda = cuda.with_memory_limit(*limit);
                }
                Ok(cuda.build())
            }
            #[cfg(not(feature = "cuda"))]
            Err(not_compiled("cuda"))
        }
        ExecutionProvider::DirectMl { device_id } => {
            #[cfg(feature = "directml")]
            {
                Ok(ep::DirectMLExecutionProvider::default()
                    .with_device_id(*device_id)
                    .build())
            }
            #[cfg(not(feature = "directml"))]
            Err(not_compiled("directml"))
        }
        ExecutionProvider::CoreMl { neural_engine_only } => {
            #[cfg(feature = "coreml")]
            {
                let mut coreml = ep::CoreMLExecutionProvider::default();
                if *neural_engine_only {
                    coreml = coreml
                        .with_compute_units(ep::coreml::CoreMLComputeUnits::CPUAndNeuralEngine);
                }
                Ok(coreml.build())
            }
            #[cfg(not(feature = "coreml"))]
            Err(not_compiled("coreml"))
        }
    }
}

#[cfg(not(all(feature = "cuda", feature = "directml", feature = "coreml")))]
fn not_compiled(feature: &str) -> ort::Error {
    ort::Error::new(format!(
        "{feature} execution provider requested but the '{feature}' feature is not enabled"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_always_dispatches() {
        assert!(dispatch(&ExecutionProvider::Cpu).is_ok());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_without_feature_is_rejected() {
        let err = dispatch(&ExecutionProvider::Cuda {
            device_id: 0,
            memory_limit: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("cuda"));
    }

    #[test]
    fn test_log_level_saturates() {
        assert!(matches!(log_level(0), LogLevel::Verbose));
        assert!(matches!(log_level(9), LogLevel::Fatal));
    }
}
