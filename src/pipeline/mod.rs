//! Detection entry point.
//!
//! [`TextDetectionPipeline`] resolves a detector from the registry, runs it
//! over a request and, when hybrid mode is on, merges in boxes from the OBB
//! detector.

mod pass;

pub use pass::{MIN_BOX_AREA, filter_by_area, majority_horizontal, run_detector};

use crate::core::config::ConfigValidator;
use crate::core::errors::DetectorError;
use crate::detector::{DetectorKind, DetectorRegistry};
use crate::domain::{DetectionRequest, DetectionResult};
use crate::processors::merge_detection_boxes;
use rayon::prelude::*;
use std::time::Instant;

/// Runs detection requests against detectors held by a [`DetectorRegistry`].
#[derive(Debug)]
pub struct TextDetectionPipeline {
    registry: DetectorRegistry,
}

impl TextDetectionPipeline {
    /// Creates a pipeline that owns `registry`.
    pub fn new(registry: DetectorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    /// Detects text regions in `request` with the `kind` detector.
    ///
    /// The result's boxes are in original image coordinates and its mask has
    /// the original image's size. A failing auxiliary detector in hybrid mode
    /// is logged and the primary result is returned unchanged.
    ///
    /// # Errors
    ///
    /// Invalid parameters, a detector that cannot be loaded and primary
    /// inference failures are returned as [`DetectorError`].
    pub fn detect(
        &self,
        kind: DetectorKind,
        request: &DetectionRequest,
    ) -> Result<DetectionResult, DetectorError> {
        request.params.validate()?;
        request.hybrid.validate()?;

        let start = Instant::now();
        let detector = self.registry.get_loaded(kind, request.params.device)?;
        let primary = run_detector(detector.as_ref(), request)?;

        let result = if request.hybrid.enabled && kind != DetectorKind::YoloObb {
            self.merge_auxiliary(primary, request)
        } else {
            primary
        };

        let (w, h) = request.dimensions();
        tracing::info!(
            "{} found {} boxes in {}x{} image in {:.2?}",
            kind,
            result.boxes.len(),
            w,
            h,
            start.elapsed()
        );
        Ok(result)
    }

    fn merge_auxiliary(
        &self,
        primary: DetectionResult,
        request: &DetectionRequest,
    ) -> DetectionResult {
        let mut aux_request = request.clone();
        aux_request.params.text_threshold = request.hybrid.conf;
        aux_request.params.iou_threshold = request.hybrid.iou;

        let auxiliary = self
            .registry
            .get_loaded(DetectorKind::YoloObb, request.params.device)
            .and_then(|detector| run_detector(detector.as_ref(), &aux_request));

        match auxiliary {
            Ok(aux) => {
                tracing::debug!(
                    "hybrid merge: {} primary boxes, {} auxiliary boxes",
                    primary.boxes.len(),
                    aux.boxes.len()
                );
                DetectionResult {
                    boxes: merge_detection_boxes(primary.boxes, aux.boxes),
                    raw_mask: primary.raw_mask,
                    debug_mask: primary.debug_mask,
                }
            }
            Err(e) => {
                tracing::error!("auxiliary detector failed, keeping primary result: {}", e);
                primary
            }
        }
    }

    /// Runs [`detect`](Self::detect) over several requests, in parallel when
    /// the batch is larger than the configured threshold. Results keep the
    /// order of `requests`.
    pub fn detect_batch(
        &self,
        kind: DetectorKind,
        requests: &[DetectionRequest],
    ) -> Vec<Result<DetectionResult, DetectorError>> {
        if requests.len() <= self.registry.config().parallel.batch_threshold {
            requests.iter().map(|r| self.detect(kind, r)).collect()
        } else {
            tracing::debug!("detecting {} images in parallel", requests.len());
            requests.par_iter().map(|r| self.detect(kind, r)).collect()
        }
    }
}
