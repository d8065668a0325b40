//! Error types for the detection pipeline.

mod types;

pub use types::{DetectorError, ProcessingStage};

/// Convenience result alias used across the crate.
pub type DetectorResult<T> = Result<T, DetectorError>;
