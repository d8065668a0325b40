//! Helpers for working directly with ONNX Runtime sessions.

use crate::core::errors::DetectorError;
use ort::logging::LogLevel;
use ort::session::{Session, builder::SessionBuilder};
use std::path::Path;

const SESSION_CREATION_FAILURE: &str = "failed to create ONNX session";

/// Loads a session with default logging configuration.
pub fn load_session(model_path: impl AsRef<Path>) -> Result<Session, DetectorError> {
    load_session_with(
        model_path,
        |builder| builder.with_log_level(LogLevel::Error),
        Some("verify model file exists and is readable"),
    )
}

/// Builds a session using a caller-provided builder configuration.
pub(crate) fn load_session_with<F>(
    model_path: impl AsRef<Path>,
    configure_builder: F,
    suggestion: Option<&str>,
) -> Result<Session, DetectorError>
where
    F: FnOnce(SessionBuilder) -> Result<SessionBuilder, ort::Error>,
{
    let path = model_path.as_ref();
    if !path.is_file() {
        return Err(DetectorError::model_load_error(
            path,
            "model file not found",
            suggestion,
            None::<std::io::Error>,
        ));
    }
    let builder = Session::builder()?;
    let builder = configure_builder(builder)?;
    let session = builder.commit_from_file(path).map_err(|e| {
        DetectorError::model_load_error(path, SESSION_CREATION_FAILURE, suggestion, Some(e))
    })?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_model_load_error() {
        let err = load_session("does/not/exist.onnx").unwrap_err();
        assert!(matches!(err, DetectorError::ModelLoad { .. }));
        assert!(err.to_string().contains("does/not/exist.onnx"));
    }
}
