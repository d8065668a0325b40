//! One detector's run over a request: filters, area filter and auto-rotation.

use crate::core::errors::DetectorError;
use crate::detector::DetectorBackend;
use crate::domain::{
    DetectionRequest, DetectionResult, Orientation, OrientedBox, ProbabilityMask, RawDetection,
};
use crate::processors::filters::{AppliedFilters, FilterChain, resize_mask};

/// Boxes at or below this many pixels of axis-aligned area are always dropped.
pub const MIN_BOX_AREA: f32 = 16.0;

/// Drops boxes that are too small in absolute terms or relative to `image_area`.
pub fn filter_by_area(boxes: Vec<OrientedBox>, image_area: f32, min_ratio: f32) -> Vec<OrientedBox> {
    boxes
        .into_iter()
        .filter(|b| {
            let area = b.area();
            area > MIN_BOX_AREA && image_area > 0.0 && area / image_area > min_ratio
        })
        .collect()
}

/// True when strictly more boxes are horizontal than vertical.
pub fn majority_horizontal(boxes: &[OrientedBox]) -> bool {
    let horizontal = boxes
        .iter()
        .filter(|b| b.orientation() == Orientation::Horizontal)
        .count();
    horizontal * 2 > boxes.len()
}

struct Pass {
    raw: RawDetection,
    applied: AppliedFilters,
}

/// Filters, detects, removes the border and applies the area filter.
///
/// Boxes stay in rotated space so the orientation vote sees what the detector saw.
fn single_pass(
    detector: &dyn DetectorBackend,
    request: &DetectionRequest,
) -> Result<Pass, DetectorError> {
    let params = &request.params;
    let (filtered, applied) = FilterChain::from_params(params).apply(&request.image);
    let raw = detector.detect_raw(&filtered, params)?;
    let found = raw.boxes.len();

    let mut raw = applied.remove_border(raw);
    let (w, h) = request.dimensions();
    raw.boxes = filter_by_area(raw.boxes, w as f32 * h as f32, params.min_box_area_ratio);
    tracing::debug!(
        "{}: {} boxes detected, {} kept after border and area filtering",
        detector.name(),
        found,
        raw.boxes.len()
    );
    Ok(Pass { raw, applied })
}

fn finish(pass: Pass, width: u32, height: u32) -> DetectionResult {
    let raw = pass.applied.remove_rotation(pass.raw);
    DetectionResult {
        boxes: raw.boxes,
        raw_mask: raw
            .raw_mask
            .map(|m| resize_mask(m, width, height))
            .unwrap_or_else(|| ProbabilityMask::new(width, height)),
        debug_mask: raw.debug_mask,
    }
}

/// Runs `detector` over `request`, retrying once with the rotation toggled
/// when auto-rotate is on and most surviving boxes are horizontal.
pub fn run_detector(
    detector: &dyn DetectorBackend,
    request: &DetectionRequest,
) -> Result<DetectionResult, DetectorError> {
    let (width, height) = request.dimensions();
    let pass = single_pass(detector, request)?;

    if request.params.auto_rotate
        && !pass.raw.boxes.is_empty()
        && majority_horizontal(&pass.raw.boxes)
    {
        let retry = request.rotation_retry();
        tracing::info!(
            "{}: most boxes are horizontal, retrying with rotate={}",
            detector.name(),
            retry.params.rotate
        );
        let retry_pass = single_pass(detector, &retry)?;
        return Ok(finish(retry_pass, width, height));
    }

    Ok(finish(pass, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Device;
    use crate::domain::{Aabb, DetectionParams};
    use image::RgbImage;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FixedBoxes {
        boxes: Vec<OrientedBox>,
        calls: Arc<AtomicUsize>,
    }

    impl DetectorBackend for FixedBoxes {
        fn name(&self) -> &str {
            "fixed"
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
            _image: &RgbImage,
            _params: &DetectionParams,
        ) -> Result<RawDetection, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawDetection {
                boxes: self.boxes.clone(),
                ..Default::default()
            })
        }
    }

    fn boxed(x0: f32, y0: f32, x1: f32, y1: f32) -> OrientedBox {
        OrientedBox::from_aabb(Aabb::new(x0, y0, x1, y1), 0.9)
    }

    fn request(auto_rotate: bool) -> DetectionRequest {
        DetectionRequest::new(RgbImage::new(800, 600)).with_params(DetectionParams {
            auto_rotate,
            ..Default::default()
        })
    }

    #[test]
    fn test_area_filter_drops_small_boxes() {
        let boxes = vec![
            boxed(0.0, 0.0, 4.0, 4.0),
            boxed(0.0, 0.0, 10.0, 10.0),
            boxed(0.0, 0.0, 30.0, 30.0),
        ];
        let kept = filter_by_area(boxes, 800.0 * 600.0, 0.0009);
        assert_eq!(kept.len(), 1);
        for b in &kept {
            assert!(b.area() > MIN_BOX_AREA);
            assert!(b.area() / (800.0 * 600.0) > 0.0009);
        }
    }

    #[test]
    fn test_horizontal_majority_retries_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = FixedBoxes {
            boxes: vec![boxed(100.0, 100.0, 300.0, 150.0)],
            calls: Arc::clone(&calls),
        };
        let result = run_detector(&detector, &request(true)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // The retry ran rotated, so its box maps back through the inverse rotation.
        assert_eq!(result.boxes[0].aabb(), Aabb::new(100.0, 300.0, 150.0, 500.0));
        assert_eq!(result.raw_mask.dimensions(), (800, 600));
    }

    #[test]
    fn test_vertical_majority_and_empty_results_do_not_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let vertical = FixedBoxes {
            boxes: vec![boxed(100.0, 100.0, 150.0, 300.0), boxed(200.0, 100.0, 400.0, 150.0)],
            calls: Arc::clone(&calls),
        };
        let result = run_detector(&vertical, &request(true)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.boxes.len(), 2);

        let calls = Arc::new(AtomicUsize::new(0));
        let empty = FixedBoxes {
            boxes: Vec::new(),
            calls: Arc::clone(&calls),
        };
        run_detector(&empty, &request(true)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auto_rotate_off_never_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = FixedBoxes {
            boxes: vec![boxed(100.0, 100.0, 300.0, 150.0)],
            calls: Arc::clone(&calls),
        };
        let result = run_detector(&detector, &request(false)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.boxes[0].aabb(), Aabb::new(100.0, 100.0, 300.0, 150.0));
    }

    #[test]
    fn test_results_stay_inside_small_padded_image() {
        let detector = FixedBoxes {
            boxes: vec![
                boxed(350.0, 50.0, 400.0, 120.0),
                boxed(200.0, 100.0, 380.0, 300.0),
            ],
            ..Default::default()
        };
        let req = DetectionRequest::new(RgbImage::new(300, 200));
        let result = run_detector(&detector, &req).unwrap();
        assert_eq!(result.boxes.len(), 1);
        let a = result.boxes[0].aabb();
        assert!(a.x_max <= 300.0 && a.y_max <= 200.0);
        assert_eq!(result.raw_mask.dimensions(), (300, 200));
    }
}
