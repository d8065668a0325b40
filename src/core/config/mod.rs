//! Configuration management for the detection pipeline.
//!
//! This module provides configuration types, validation traits, and device
//! selection for the ONNX Runtime backed detectors.

pub mod device;
pub mod errors;
pub mod onnx;
pub mod parallel;

pub use device::Device;
pub use errors::{ConfigError, ConfigValidator};
pub use onnx::*;
pub use parallel::ParallelPolicy;
