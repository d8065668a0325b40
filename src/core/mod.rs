//! Building blocks shared by every detector.
//!
//! - Configuration types and validation
//! - Error handling
//! - ONNX Runtime session management

pub mod config;
pub mod errors;
pub mod inference;
#[macro_use]
pub mod macros;

pub use config::{ConfigError, ConfigValidator, Device, OrtSessionConfig, ParallelPolicy};
pub use errors::{DetectorError, DetectorResult, ProcessingStage};
pub use inference::{OrtInfer, TensorOutput};
