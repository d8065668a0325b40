//! Detector variants and their lifecycle.
//!
//! The set of detectors is closed: [`DetectorKind`] names the built-in
//! ones, and [`Detector`] wraps each variant plus a [`Detector::Custom`]
//! escape hatch for embedders. Every variant implements [`DetectorBackend`].

mod db_detector;
pub mod loader;
mod none_detector;
pub mod registry;
mod yolo_obb_detector;

pub use db_detector::DbDetector;
pub use loader::{ModelSlot, ModelSource, ModelSpec};
pub use none_detector::NoneDetector;
pub use registry::{DetectorRegistry, RegistryConfig};
pub use yolo_obb_detector::YoloObbDetector;

use crate::core::config::{ConfigError, Device};
use crate::core::errors::DetectorError;
use crate::domain::{DetectionParams, RawDetection};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a built-in detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// DB heat-map detector.
    Default,
    /// Detects nothing.
    None,
    /// Oriented speech-bubble detector; also the hybrid auxiliary.
    YoloObb,
}

impl DetectorKind {
    /// Every kind, in the order the CLI lists them.
    pub const ALL: [DetectorKind; 3] = [
        DetectorKind::Default,
        DetectorKind::None,
        DetectorKind::YoloObb,
    ];

    /// Name used in configuration files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Default => "default",
            DetectorKind::None => "none",
            DetectorKind::YoloObb => "yolo_obb",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        DetectorKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| ConfigError::InvalidConfig {
                message: format!(
                    "unknown detector '{s}', expected one of: default, none, yolo_obb"
                ),
            })
    }
}

/// Lifecycle and raw detection shared by every detector.
///
/// `detect_raw` sees the already filtered image and reports boxes and masks
/// in that image's coordinates. Filtering, area filtering and auto-rotation
/// are the pipeline's job.
pub trait DetectorBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Loads weights and creates the inference session. Idempotent.
    fn load(&self, device: Device) -> Result<(), DetectorError>;

    /// Releases the inference session. A later `load` starts over.
    fn unload(&self);

    fn is_loaded(&self) -> bool;

    /// Makes sure weight files are on disk without creating a session.
    fn prepare(&self) -> Result<(), DetectorError> {
        Ok(())
    }

    fn detect_raw(
        &self,
        image: &RgbImage,
        params: &DetectionParams,
    ) -> Result<RawDetection, DetectorError>;
}

/// A detector instance, owned by the registry behind an `Arc`.
#[derive(Debug)]
pub enum Detector {
    Db(DbDetector),
    None(NoneDetector),
    YoloObb(YoloObbDetector),
    Custom(Box<dyn DetectorBackend>),
}

impl Detector {
    fn backend(&self) -> &dyn DetectorBackend {
        match self {
            Detector::Db(d) => d,
            Detector::None(d) => d,
            Detector::YoloObb(d) => d,
            Detector::Custom(d) => d.as_ref(),
        }
    }
}

impl DetectorBackend for Detector {
    fn name(&self) -> &str {
        self.backend().name()
    }

    fn load(&self, device: Device) -> Result<(), DetectorError> {
        self.backend().load(device)
    }

    fn unload(&self) {
        self.backend().unload()
    }

    fn is_loaded(&self) -> bool {
        self.backend().is_loaded()
    }

    fn prepare(&self) -> Result<(), DetectorError> {
        self.backend().prepare()
    }

    fn detect_raw(
        &self,
        image: &RgbImage,
        params: &DetectionParams,
    ) -> Result<RawDetection, DetectorError> {
        self.backend().detect_raw(image, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parses_and_displays() {
        assert_eq!("default".parse::<DetectorKind>().unwrap(), DetectorKind::Default);
        assert_eq!("YOLO-OBB".parse::<DetectorKind>().unwrap(), DetectorKind::YoloObb);
        assert_eq!(DetectorKind::YoloObb.to_string(), "yolo_obb");
        assert!("craft".parse::<DetectorKind>().is_err());
    }

    #[test]
    fn test_none_variant_dispatches() {
        let detector = Detector::None(NoneDetector::default());
        assert_eq!(detector.name(), "none");
        detector.load(Device::Cpu).unwrap();
        assert!(detector.is_loaded());
        let raw = detector
            .detect_raw(&RgbImage::new(10, 10), &DetectionParams::default())
            .unwrap();
        assert!(raw.boxes.is_empty());
    }
}
