//! ONNX Runtime integration.
//!
//! [`OrtInfer`] owns one ONNX Runtime session behind a mutex and exposes a
//! single-input, multi-output inference call. Output interpretation is left
//! to the detector that owns the engine.

mod providers;
mod session;
mod tensor_output;

pub use session::load_session;
pub use tensor_output::TensorOutput;

use crate::core::config::OrtSessionConfig;
use crate::core::errors::DetectorError;
use ndarray::Array4;
use ort::logging::LogLevel;
use ort::session::{Session, SessionInputs};
use ort::value::TensorRef;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Mutex;

/// A loaded ONNX model ready for inference.
#[derive(Debug)]
pub struct OrtInfer {
    session: Mutex<Session>,
    input_name: String,
    model_name: String,
}

impl OrtInfer {
    /// Loads `model_path` with the given session configuration.
    ///
    /// The input tensor name is read from the model's first declared input.
    pub fn from_config(
        model_path: impl AsRef<Path>,
        model_name: impl Into<String>,
        config: Option<&OrtSessionConfig>,
    ) -> Result<Self, DetectorError> {
        let path = model_path.as_ref();
        let session = session::load_session_with(
            path,
            |builder| match config {
                Some(cfg) => providers::configure(builder, cfg),
                None => builder.with_log_level(LogLevel::Error),
            },
            Some("check device/EP configuration and model file"),
        )?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| {
                DetectorError::model_load_error(
                    path,
                    "model declares no inputs",
                    None,
                    None::<std::io::Error>,
                )
            })?;

        let model_name = model_name.into();
        tracing::debug!(
            "Loaded model '{}' from {} (input '{}')",
            model_name,
            path.display(),
            input_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            model_name,
        })
    }

    /// Returns the model name associated with this inference engine.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Runs the model on a single NCHW batch.
    ///
    /// Returns every declared output as `(name, tensor)` in declaration order.
    pub fn infer(&self, input: &Array4<f32>) -> Result<Vec<(String, TensorOutput)>, DetectorError> {
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data = input.as_slice().ok_or_else(|| DetectorError::InvalidInput {
            message: "input tensor is not contiguous in memory".to_string(),
        })?;
        let tensor_ref =
            TensorRef::from_array_view((dims, data)).map_err(|e| DetectorError::InvalidInput {
                message: format!("failed to create input TensorRef: {e}"),
            })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectorError::InvalidInput {
                message: format!("model '{}': session lock poisoned", self.model_name),
            })?;

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        let inputs: SessionInputs<'_, '_, 0> = SessionInputs::ValueMap(vec![(
            Cow::Borrowed(self.input_name.as_str()),
            tensor_ref.into(),
        )]);
        let outputs = session.run(inputs).map_err(|e| {
            DetectorError::inference_error(
                &self.model_name,
                format!("forward pass with input shape {:?}", input.shape()),
                e,
            )
        })?;

        let mut results = Vec::with_capacity(output_names.len());
        for name in &output_names {
            let value = &outputs[name.as_str()];
            let tensor = if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                TensorOutput::F32 {
                    shape: shape.iter().copied().collect(),
                    data: data.to_vec(),
                }
            } else if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
                TensorOutput::I64 {
                    shape: shape.iter().copied().collect(),
                    data: data.to_vec(),
                }
            } else {
                return Err(DetectorError::InvalidInput {
                    message: format!(
                        "model '{}': output '{}' has an unsupported element type",
                        self.model_name, name
                    ),
                });
            };
            results.push((name.clone(), tensor));
        }

        Ok(results)
    }
}
