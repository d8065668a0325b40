//! Process-wide detector cache owned by the pipeline.

use super::loader::{ModelSource, ModelSpec};
use super::{DbDetector, Detector, DetectorBackend, DetectorKind, NoneDetector, YoloObbDetector};
use crate::core::config::{ConfigError, ConfigValidator, Device, OrtSessionConfig, ParallelPolicy};
use crate::core::errors::DetectorError;
use crate::models::weights::{HttpWeightFetcher, ModelWeights, WeightFetcher};
use crate::processors::{DbPostProcess, ObbDecodeConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where models live and how their sessions are configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory that relative model paths and downloaded weights resolve against.
    pub model_dir: PathBuf,
    /// Model file per detector kind. Kinds without a model need no entry.
    pub sources: HashMap<DetectorKind, ModelSource>,
    /// Session settings applied to every model; the device picks the providers.
    pub session: OrtSessionConfig,
    /// Decoder settings for the oriented-box detector.
    pub obb: ObbDecodeConfig,
    /// Thread pool size and the thresholds above which work runs in parallel.
    pub parallel: ParallelPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let sources = HashMap::from([
            (
                DetectorKind::Default,
                ModelSource::Local(PathBuf::from("detect.onnx")),
            ),
            (
                DetectorKind::YoloObb,
                ModelSource::Remote(ModelWeights::yolo_obb()),
            ),
        ]);
        Self {
            model_dir: PathBuf::from("models"),
            sources,
            session: OrtSessionConfig::default(),
            obb: ObbDecodeConfig::default(),
            parallel: ParallelPolicy::default(),
        }
    }
}

impl ConfigValidator for RegistryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.obb.validate()
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

impl RegistryConfig {
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    /// Sets or replaces the model source for `kind`.
    pub fn with_source(mut self, kind: DetectorKind, source: ModelSource) -> Self {
        self.sources.insert(kind, source);
        self
    }
}

/// Lazily constructed detectors keyed by kind.
///
/// Construction happens under the map lock, so each kind is built at most
/// once. Loading is serialized per detector by the detector itself, which
/// lets different kinds load in parallel.
#[derive(Debug)]
pub struct DetectorRegistry {
    config: RegistryConfig,
    fetcher: Arc<dyn WeightFetcher>,
    detectors: Mutex<HashMap<DetectorKind, Arc<Detector>>>,
}

impl DetectorRegistry {
    /// Creates an empty registry that downloads remote weights over HTTP.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_fetcher(config, Arc::new(HttpWeightFetcher::default()))
    }

    /// Creates an empty registry that fetches remote weights with `fetcher`.
    ///
    /// Nothing is constructed or downloaded until a detector is requested.
    pub fn with_fetcher(config: RegistryConfig, fetcher: Arc<dyn WeightFetcher>) -> Self {
        Self {
            config,
            fetcher,
            detectors: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration detectors are built from.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn detectors(&self) -> MutexGuard<'_, HashMap<DetectorKind, Arc<Detector>>> {
        self.detectors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spec(&self, kind: DetectorKind) -> Result<ModelSpec, ConfigError> {
        let source = self
            .config
            .sources
            .get(&kind)
            .cloned()
            .ok_or_else(|| ConfigError::InvalidConfig {
                message: format!("no model source configured for detector '{kind}'"),
            })?;
        Ok(ModelSpec {
            name: kind.to_string(),
            source,
            model_dir: self.config.model_dir.clone(),
            session: self.config.session.clone(),
            fetcher: Arc::clone(&self.fetcher),
        })
    }

    fn build(&self, kind: DetectorKind) -> Result<Detector, DetectorError> {
        Ok(match kind {
            DetectorKind::None => Detector::None(NoneDetector),
            DetectorKind::Default => Detector::Db(DbDetector::new(
                self.spec(kind)?,
                DbPostProcess::default().with_parallel_policy(self.config.parallel.clone()),
            )),
            DetectorKind::YoloObb => {
                self.config.obb.validate()?;
                Detector::YoloObb(YoloObbDetector::new(
                    self.spec(kind)?,
                    self.config.obb.clone(),
                ))
            }
        })
    }

    /// Returns the detector for `kind`, constructing it on first use. Does not load it.
    pub fn get(&self, kind: DetectorKind) -> Result<Arc<Detector>, DetectorError> {
        let mut detectors = self.detectors();
        if let Some(existing) = detectors.get(&kind) {
            return Ok(Arc::clone(existing));
        }
        let detector = Arc::new(self.build(kind)?);
        tracing::debug!("Constructed detector '{}'", kind);
        detectors.insert(kind, Arc::clone(&detector));
        Ok(detector)
    }

    /// Returns the detector for `kind`, loaded on `device`.
    ///
    /// Concurrent first calls for the same kind share one load: weights are
    /// fetched and the session is created once.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::ConfigError`] when the kind has no model source
    /// or its decoder settings are invalid, and the loader's error when the
    /// weights cannot be fetched or the session cannot be created.
    pub fn get_loaded(
        &self,
        kind: DetectorKind,
        device: Device,
    ) -> Result<Arc<Detector>, DetectorError> {
        let detector = self.get(kind)?;
        detector.load(device)?;
        Ok(detector)
    }

    /// Downloads any weights `kind` needs without creating a session.
    pub fn prepare(&self, kind: DetectorKind) -> Result<(), DetectorError> {
        self.get(kind)?.prepare()
    }

    /// Preseeds or replaces the detector for `kind`. Returns the previous one.
    pub fn insert(&self, kind: DetectorKind, detector: Detector) -> Option<Arc<Detector>> {
        self.detectors().insert(kind, Arc::new(detector))
    }

    /// Unloads and evicts the detector for `kind`. Returns whether one was cached.
    pub fn unload(&self, kind: DetectorKind) -> bool {
        let removed = self.detectors().remove(&kind);
        match removed {
            Some(detector) => {
                detector.unload();
                true
            }
            None => false,
        }
    }

    /// Kinds currently cached.
    pub fn cached_kinds(&self) -> Vec<DetectorKind> {
        let mut kinds: Vec<_> = self.detectors().keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DetectionParams, RawDetection};
    use image::RgbImage;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingDetector {
        loads: Arc<AtomicUsize>,
        loaded: AtomicBool,
    }

    impl DetectorBackend for CountingDetector {
        fn name(&self) -> &str {
            "counting"
        }

        fn load(&self, _device: Device) -> Result<(), DetectorError> {
            if !self.loaded.swap(true, Ordering::SeqCst) {
                self.loads.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        fn unload(&self) {
            self.loaded.store(false, Ordering::SeqCst);
        }

        fn is_loaded(&self) -> bool {
            self.loaded.load(Ordering::SeqCst)
        }

        fn detect_raw(
            &self,
            _image: &RgbImage,
            _params: &DetectionParams,
        ) -> Result<RawDetection, DetectorError> {
            Ok(RawDetection::default())
        }
    }

    #[derive(Debug)]
    struct FailingFetcher;

    impl WeightFetcher for FailingFetcher {
        fn fetch(&self, url: &str, _dest: &Path) -> Result<(), DetectorError> {
            Err(DetectorError::WeightFetch {
                url: url.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    fn offline_registry(dir: &Path) -> DetectorRegistry {
        DetectorRegistry::with_fetcher(
            RegistryConfig::default().with_model_dir(dir),
            Arc::new(FailingFetcher),
        )
    }

    #[test]
    fn test_get_constructs_once_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let registry = offline_registry(dir.path());
        let first = registry.get(DetectorKind::None).unwrap();
        let handles: Vec<_> = std::thread::scope(|s| {
            (0..8)
                .map(|_| s.spawn(|| registry.get(DetectorKind::None).unwrap()))
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });
        assert!(handles.iter().all(|d| Arc::ptr_eq(d, &first)));
        assert_eq!(registry.cached_kinds(), vec![DetectorKind::None]);
    }

    #[test]
    fn test_inserted_detector_loads_once_and_unloads() {
        let dir = tempfile::tempdir().unwrap();
        let registry = offline_registry(dir.path());
        let loads = Arc::new(AtomicUsize::new(0));
        registry.insert(
            DetectorKind::Default,
            Detector::Custom(Box::new(CountingDetector {
                loads: Arc::clone(&loads),
                ..Default::default()
            })),
        );

        let d = registry.get_loaded(DetectorKind::Default, Device::Cpu).unwrap();
        registry.get_loaded(DetectorKind::Default, Device::Cpu).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(d.is_loaded());

        assert!(registry.unload(DetectorKind::Default));
        assert!(!d.is_loaded());
        assert!(!registry.unload(DetectorKind::Default));
    }

    #[test]
    fn test_missing_default_model_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let registry = offline_registry(dir.path());
        let err = registry
            .get_loaded(DetectorKind::Default, Device::Cpu)
            .unwrap_err();
        assert!(matches!(err, DetectorError::ModelLoad { .. }), "{err}");
    }

    #[test]
    fn test_prepare_surfaces_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let registry = offline_registry(dir.path());
        let err = registry.prepare(DetectorKind::YoloObb).unwrap_err();
        assert!(matches!(err, DetectorError::WeightFetch { .. }));
        assert!(registry.prepare(DetectorKind::None).is_ok());
    }

    #[test]
    fn test_unconfigured_kind_is_config_error() {
        let mut config = RegistryConfig::default();
        config.sources.remove(&DetectorKind::YoloObb);
        let registry = DetectorRegistry::with_fetcher(config, Arc::new(FailingFetcher));
        let err = registry.get(DetectorKind::YoloObb).unwrap_err();
        assert!(matches!(err, DetectorError::ConfigError { .. }));
    }

    #[test]
    fn test_invalid_obb_config_is_rejected_on_construction() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RegistryConfig::default().with_model_dir(dir.path());
        config.obb.input_size = 0;
        assert!(config.validate().is_err());

        let registry = DetectorRegistry::with_fetcher(config, Arc::new(FailingFetcher));
        let err = registry.get(DetectorKind::YoloObb).unwrap_err();
        assert!(matches!(err, DetectorError::ConfigError { .. }), "{err}");
        assert!(registry.cached_kinds().is_empty());
    }

    #[derive(Debug)]
    struct SlowFetcher {
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    impl WeightFetcher for SlowFetcher {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<(), DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(50));
            std::fs::write(dest, &self.body)?;
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_first_load_fetches_weights_once() {
        use sha2::{Digest, Sha256};

        let dir = tempfile::tempdir().unwrap();
        let body = b"not an onnx graph".to_vec();
        let weights = ModelWeights::new(
            "bubble.onnx",
            "https://example.invalid/bubble.onnx",
            format!("{:x}", Sha256::digest(&body)),
        );
        let fetcher = Arc::new(SlowFetcher {
            body,
            calls: AtomicUsize::new(0),
        });
        let registry = DetectorRegistry::with_fetcher(
            RegistryConfig::default()
                .with_model_dir(dir.path())
                .with_source(DetectorKind::YoloObb, ModelSource::Remote(weights)),
            Arc::clone(&fetcher) as Arc<dyn WeightFetcher>,
        );

        let results: Vec<_> = std::thread::scope(|s| {
            (0..8)
                .map(|_| s.spawn(|| registry.get_loaded(DetectorKind::YoloObb, Device::Cpu)))
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });

        // The payload is not a model, so every session creation fails after the fetch.
        assert!(results.iter().all(|r| r.is_err()));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("bubble.onnx").is_file());
    }
}
