//! Lazy, single-flight model loading shared by the model-backed detectors.

use crate::core::config::{Device, OrtSessionConfig};
use crate::core::errors::DetectorError;
use crate::core::inference::OrtInfer;
use crate::models::weights::{ModelWeights, WeightFetcher, ensure_weights};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Where a detector's model file comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// A file on disk. Relative paths resolve against the model directory.
    Local(PathBuf),
    /// A file downloaded into the model directory and verified by digest.
    Remote(ModelWeights),
}

/// Everything needed to turn a [`ModelSource`] into an inference session.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Detector name used in logs and errors.
    pub name: String,
    pub source: ModelSource,
    /// Directory for downloads and relative local paths.
    pub model_dir: PathBuf,
    /// Base session settings; providers are replaced per device.
    pub session: OrtSessionConfig,
    /// Downloader for remote weights.
    pub fetcher: Arc<dyn WeightFetcher>,
}

impl ModelSpec {
    /// Local path of the model, downloading remote weights when needed.
    pub fn prepare(&self) -> Result<PathBuf, DetectorError> {
        match &self.source {
            ModelSource::Local(path) => {
                let path = resolve(&self.model_dir, path);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(DetectorError::model_load_error(
                        &path,
                        "model file not found",
                        Some("place the ONNX file there or point --model-dir at it"),
                        None::<std::io::Error>,
                    ))
                }
            }
            ModelSource::Remote(weights) => {
                ensure_weights(&self.model_dir, weights, self.fetcher.as_ref())
            }
        }
    }

    fn open(&self, device: Device) -> Result<OrtInfer, DetectorError> {
        device.ensure_available()?;
        let path = self.prepare()?;
        let session = self.session.for_device(&device);
        OrtInfer::from_config(&path, &self.name, Some(&session))
    }
}

fn resolve(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

/// Holds at most one loaded model behind a mutex.
///
/// The lock is held for the whole load, so concurrent first callers wait for
/// a single load instead of starting their own.
#[derive(Debug)]
pub struct ModelSlot<M> {
    spec: ModelSpec,
    model: Mutex<Option<Arc<M>>>,
}

impl<M> ModelSlot<M> {
    pub fn new(spec: ModelSpec) -> Self {
        Self {
            spec,
            model: Mutex::new(None),
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn guard(&self) -> MutexGuard<'_, Option<Arc<M>>> {
        self.model.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Loads the model once. Later calls return immediately.
    pub fn load_with(
        &self,
        device: Device,
        build: impl FnOnce(OrtInfer) -> M,
    ) -> Result<(), DetectorError> {
        let mut slot = self.guard();
        if slot.is_some() {
            return Ok(());
        }
        let started = std::time::Instant::now();
        let inference = self.spec.open(device)?;
        *slot = Some(Arc::new(build(inference)));
        info!(
            "Loaded detector '{}' on {} in {:.2?}",
            self.spec.name,
            device,
            started.elapsed()
        );
        Ok(())
    }

    /// The loaded model, or [`DetectorError::DetectorNotLoaded`].
    pub fn get(&self) -> Result<Arc<M>, DetectorError> {
        self.guard()
            .clone()
            .ok_or_else(|| DetectorError::DetectorNotLoaded {
                name: self.spec.name.clone(),
            })
    }

    /// Drops the model. In-flight calls keep their own handle until they finish.
    pub fn unload(&self) {
        if self.guard().take().is_some() {
            info!("Unloaded detector '{}'", self.spec.name);
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.guard().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::weights::HttpWeightFetcher;

    fn spec(source: ModelSource, dir: &Path) -> ModelSpec {
        ModelSpec {
            name: "bubble".to_string(),
            source,
            model_dir: dir.to_path_buf(),
            session: OrtSessionConfig::default(),
            fetcher: Arc::new(HttpWeightFetcher::default()),
        }
    }

    #[test]
    fn test_missing_local_model_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let slot: ModelSlot<()> =
            ModelSlot::new(spec(ModelSource::Local("missing.onnx".into()), dir.path()));
        let err = slot.load_with(Device::Cpu, |_| ()).unwrap_err();
        assert!(matches!(err, DetectorError::ModelLoad { .. }));
        assert!(!slot.is_loaded());
        assert!(matches!(
            slot.get().unwrap_err(),
            DetectorError::DetectorNotLoaded { .. }
        ));
    }

    #[test]
    fn test_relative_local_path_resolves_against_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("detect.onnx"), b"onnx").unwrap();
        let spec = spec(ModelSource::Local("detect.onnx".into()), dir.path());
        assert_eq!(spec.prepare().unwrap(), dir.path().join("detect.onnx"));
    }
}
