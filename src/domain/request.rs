//! Request and result types for a detection call.

use crate::core::config::Device;
use crate::domain::OrientedBox;
use crate::impl_config_validator;
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Single-channel floating point probability map.
pub type ProbabilityMask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Tunables for one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Long side, in pixels, the heat-map detector resizes the image to.
    pub detect_size: u32,
    /// Pixel confidence threshold. The OBB detector uses it as the box confidence threshold.
    pub text_threshold: f32,
    /// Minimum mean probability inside a heat-map box.
    pub box_threshold: f32,
    /// Rotated-IoU threshold for oriented-box suppression.
    pub iou_threshold: f32,
    /// Polygon expansion ratio for heat-map boxes.
    pub unclip_ratio: f32,
    /// Invert the image before detection, for light text on dark backgrounds.
    pub invert: bool,
    /// Apply gamma correction derived from the image's mean luminance.
    pub gamma_correct: bool,
    /// Rotate the image by 90 degrees before detection.
    pub rotate: bool,
    /// Retry once with `rotate` toggled when most boxes are horizontal.
    pub auto_rotate: bool,
    /// Boxes whose area divided by the image area is at or below this ratio are dropped.
    pub min_box_area_ratio: f32,
    /// Device the detector's model is loaded on.
    pub device: Device,
    /// Return the binarized detection map as a debug mask.
    pub verbose: bool,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            detect_size: 2048,
            text_threshold: 0.5,
            box_threshold: 0.7,
            iou_threshold: 0.6,
            unclip_ratio: 2.3,
            invert: false,
            gamma_correct: false,
            rotate: false,
            auto_rotate: false,
            min_box_area_ratio: 0.0009,
            device: Device::Cpu,
            verbose: false,
        }
    }
}

impl_config_validator!(DetectionParams {
    detect_size: min(32),
    text_threshold: range(0.0, 1.0),
    box_threshold: range(0.0, 1.0),
    iou_threshold: range(0.0, 1.0),
    unclip_ratio: min(0.0),
    min_box_area_ratio: range(0.0, 1.0),
});

/// Settings for running the auxiliary OBB detector next to the primary one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    /// Run the OBB detector as well and merge its boxes into the primary result.
    pub enabled: bool,
    /// Confidence threshold for auxiliary boxes.
    pub conf: f32,
    /// Rotated-IoU threshold for auxiliary non-maximum suppression.
    pub iou: f32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            conf: 0.4,
            iou: 0.6,
        }
    }
}

impl_config_validator!(HybridConfig {
    conf: range(0.0, 1.0),
    iou: range(0.0, 1.0),
});

/// An immutable detection call: the image plus everything that tunes it.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    /// Source image, shared with rotation retries and auxiliary passes.
    pub image: Arc<RgbImage>,
    pub params: DetectionParams,
    pub hybrid: HybridConfig,
}

impl DetectionRequest {
    /// Request with default parameters and hybrid mode off.
    pub fn new(image: impl Into<Arc<RgbImage>>) -> Self {
        Self {
            image: image.into(),
            params: DetectionParams::default(),
            hybrid: HybridConfig::default(),
        }
    }

    pub fn with_params(mut self, params: DetectionParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_hybrid(mut self, hybrid: HybridConfig) -> Self {
        self.hybrid = hybrid;
        self
    }

    /// The same request with `rotate` toggled and auto-rotate turned off.
    pub fn rotation_retry(&self) -> Self {
        let mut retry = self.clone();
        retry.params.rotate = !self.params.rotate;
        retry.params.auto_rotate = false;
        retry
    }

    /// Width and height of the source image.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Output of a single detector on an already filtered image.
///
/// Coordinates and masks are in the filtered image's space.
#[derive(Debug, Clone, Default)]
pub struct RawDetection {
    pub boxes: Vec<OrientedBox>,
    /// `None` for detectors that produce no probability map.
    pub raw_mask: Option<ProbabilityMask>,
    /// Binarized map, only when `verbose` is set.
    pub debug_mask: Option<GrayImage>,
}

/// Final boxes in original image coordinates, plus masks at the original resolution.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub boxes: Vec<OrientedBox>,
    /// Per-pixel text probability; all zeros for detectors without a map.
    pub raw_mask: ProbabilityMask,
    pub debug_mask: Option<GrayImage>,
}

impl DetectionResult {
    /// A result with no boxes and an all-zero mask of the given size.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            boxes: Vec::new(),
            raw_mask: ProbabilityMask::new(width, height),
            debug_mask: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigValidator;

    #[test]
    fn test_defaults_validate() {
        assert!(DetectionParams::default().validate().is_ok());
        assert!(HybridConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let params = DetectionParams {
            text_threshold: 1.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());
        let hybrid = HybridConfig {
            iou: -0.1,
            ..Default::default()
        };
        assert!(hybrid.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let params: DetectionParams = toml::from_str("rotate = true\ndetect_size = 1536").unwrap();
        assert!(params.rotate);
        assert_eq!(params.detect_size, 1536);
        assert_eq!(params.box_threshold, 0.7);
    }

    #[test]
    fn test_rotation_retry_toggles_and_disables_auto_rotate() {
        let params = DetectionParams {
            auto_rotate: true,
            ..Default::default()
        };
        let request = DetectionRequest::new(RgbImage::new(8, 4)).with_params(params);
        let retry = request.rotation_retry();
        assert!(retry.params.rotate);
        assert!(!retry.params.auto_rotate);
        assert!(Arc::ptr_eq(&retry.image, &request.image));
        assert_eq!(retry.dimensions(), (8, 4));
    }
}
