//! Core error types for the detection pipeline.
//!
//! This module defines the main [`DetectorError`] enum and the [`ProcessingStage`]
//! enum used to tag where a processing failure happened.

use std::path::Path;
use thiserror::Error;

/// Enum representing different stages of processing in the detection pipeline.
///
/// This enum is used to identify which stage an error occurred in,
/// providing context for debugging and error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Error occurred during tensor operations.
    TensorOperation,
    /// Error occurred while decoding raw model output.
    PostProcessing,
    /// Error occurred during detector execution.
    AdapterExecution,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::TensorOperation => write!(f, "tensor operation"),
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
            ProcessingStage::AdapterExecution => write!(f, "detector execution"),
        }
    }
}

/// Enum representing the errors that can occur while detecting text regions.
///
/// This covers image loading, model lifecycle (weight download, checksum
/// verification, session creation), inference, and configuration problems.
#[derive(Error, Debug)]
pub enum DetectorError {
    /// Error occurred while loading an image.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error occurred during inference.
    #[error("inference failed in model '{model_name}': {context}")]
    Inference {
        /// The name of the model where inference failed.
        model_name: String,
        /// Additional context about the inference error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from basic tensor operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// Error loading a model file, with context and suggestions.
    #[error("model load failed for '{model_path}': {reason}{suggestion}")]
    ModelLoad {
        /// Path to the model that failed to load
        model_path: String,
        /// Short reason string
        reason: String,
        /// Optional suggestion (prefixed with '; ' when present)
        suggestion: String,
        /// Underlying source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error downloading model weights.
    #[error("weight fetch from '{url}' failed: {reason}")]
    WeightFetch {
        /// Source URL of the weight file.
        url: String,
        /// Short reason string.
        reason: String,
    },

    /// Downloaded or cached weights do not match the expected digest.
    #[error("checksum mismatch for '{file}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Weight file name.
        file: String,
        /// Expected SHA-256 hex digest.
        expected: String,
        /// Actual SHA-256 hex digest.
        actual: String,
    },

    /// A detector was asked to run before `load` succeeded.
    #[error("detector '{name}' is not loaded")]
    DetectorNotLoaded {
        /// Detector name.
        name: String,
    },
}

impl From<image::ImageError> for DetectorError {
    /// Converts an image::ImageError to DetectorError::ImageLoad.
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl From<crate::core::config::ConfigError> for DetectorError {
    /// Converts a ConfigError to DetectorError::ConfigError.
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::ConfigError {
            message: error.to_string(),
        }
    }
}

impl DetectorError {
    /// Creates a model load error for `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Path of the model file
    /// * `reason` - Short description of the failure
    /// * `suggestion` - Optional hint for the caller
    /// * `source` - Optional underlying error
    pub fn model_load_error(
        path: &Path,
        reason: impl Into<String>,
        suggestion: Option<&str>,
        source: Option<impl std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        Self::ModelLoad {
            model_path: path.display().to_string(),
            reason: reason.into(),
            suggestion: suggestion.map(|s| format!("; {s}")).unwrap_or_default(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Creates a configuration error with enhanced context and details.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use manga_text_detect::core::errors::DetectorError;
    /// let err = DetectorError::config_error_detailed(
    ///     "device selection",
    ///     "device 'tpu' is not supported"
    /// );
    /// assert!(matches!(err, DetectorError::ConfigError { .. }));
    /// ```
    pub fn config_error_detailed(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigError {
            message: format!("{}: {}", context.into(), details.into()),
        }
    }

    /// Creates a configuration error for invalid field values.
    ///
    /// # Arguments
    ///
    /// * `field` - The name of the field with an invalid value
    /// * `expected` - Description of what was expected
    /// * `actual` - Description of what was actually provided
    pub fn invalid_field(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ConfigError {
            message: format!(
                "invalid value for field '{}': expected {}, got {}",
                field.into(),
                expected.into(),
                actual.into()
            ),
        }
    }

    /// Wraps an error raised by decoding logic at the given stage.
    pub fn processing_error(
        kind: ProcessingStage,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Wraps an error that occurred while executing a detector.
    pub fn adapter_execution_error(
        adapter: impl Into<String>,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind: ProcessingStage::AdapterExecution,
            context: format!("{}: {}", adapter.into(), context.into()),
            source: Box::new(source),
        }
    }

    /// Wraps an inference runtime failure for `model_name`.
    pub fn inference_error(
        model_name: impl Into<String>,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            model_name: model_name.into(),
            context: context.into(),
            source: Box::new(source),
        }
    }
}
