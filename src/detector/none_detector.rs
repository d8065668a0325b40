use super::DetectorBackend;
use crate::core::config::Device;
use crate::core::errors::DetectorError;
use crate::domain::{DetectionParams, ProbabilityMask, RawDetection};
use image::RgbImage;

/// Detector that finds nothing. Useful to skip detection entirely.
#[derive(Debug, Default)]
pub struct NoneDetector;

impl DetectorBackend for NoneDetector {
    fn name(&self) -> &str {
        "none"
    }

    fn load(&self, _device: Device) -> Result<(), DetectorError> {
        Ok(())
    }

    fn unload(&self) {}

    fn is_loaded(&self) -> bool {
        true
    }

    fn detect_raw(
        &self,
        image: &RgbImage,
        _params: &DetectionParams,
    ) -> Result<RawDetection, DetectorError> {
        let (w, h) = image.dimensions();
        Ok(RawDetection {
            boxes: Vec::new(),
            raw_mask: Some(ProbabilityMask::new(w, h)),
            debug_mask: None,
        })
    }
}
