//! Decoding of oriented-box detector output.
//!
//! Each prediction row is `[cx, cy, w, h, class_0 .. class_n, angle]` in
//! letterboxed model space with the angle in radians. Decoding keeps rows
//! above the confidence threshold, maps them back to image space, runs
//! rotated non-maximum suppression, resolves corners and finally drops
//! near-duplicates that survive suppression.

use crate::domain::{Aabb, OrientedBox};
use crate::impl_config_validator;
use crate::processors::geometry::{Point, convex_iou};
use crate::processors::letterbox::LetterboxTransform;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Fixed parameters of the OBB decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObbDecodeConfig {
    /// Side of the square model input.
    pub input_size: u32,
    /// Same-class boxes with centers closer than this many pixels are duplicates.
    pub dedup_distance: f32,
    /// Boxes whose axis-aligned IoU exceeds this are duplicates regardless of class.
    pub dedup_iou: f32,
    /// Label per class id. Ids past the end are labelled `class_{id}`.
    pub class_names: Vec<String>,
}

impl Default for ObbDecodeConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            dedup_distance: 10.0,
            dedup_iou: 0.3,
            class_names: ["balloon", "qipao", "shuqing", "changfangtiao", "hengxie"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl_config_validator!(ObbDecodeConfig {
    input_size: min(32),
    dedup_distance: min(0.0),
    dedup_iou: range(0.0, 1.0),
});

impl ObbDecodeConfig {
    /// Label for `class_id`, or `class_{id}` when the id has no configured name.
    pub fn class_label(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }
}

/// One decoded prediction in image space.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ObbCandidate {
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,
    angle: f32,
    score: f32,
    class_id: usize,
}

impl ObbCandidate {
    fn center(&self) -> Point {
        Point::new(self.cx, self.cy)
    }

    /// Corners as `center + v1 + v2`, `center + v1 - v2`, `center - v1 - v2`, `center - v1 + v2`.
    fn corners(&self) -> [Point; 4] {
        let (sin, cos) = self.angle.sin_cos();
        let (v1x, v1y) = (self.w / 2.0 * cos, self.w / 2.0 * sin);
        let (v2x, v2y) = (-self.h / 2.0 * sin, self.h / 2.0 * cos);
        [
            Point::new(self.cx + v1x + v2x, self.cy + v1y + v2y),
            Point::new(self.cx + v1x - v2x, self.cy + v1y - v2y),
            Point::new(self.cx - v1x - v2x, self.cy - v1y - v2y),
            Point::new(self.cx - v1x + v2x, self.cy - v1y + v2y),
        ]
    }
}

/// Post-processor for oriented-box detector output.
#[derive(Debug, Clone, Default)]
pub struct ObbPostProcess {
    config: ObbDecodeConfig,
}

impl ObbPostProcess {
    /// Creates a decoder with fixed settings. Thresholds are passed per call.
    pub fn new(config: ObbDecodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ObbDecodeConfig {
        &self.config
    }

    /// Decodes one image's predictions.
    ///
    /// `output` may be `[anchors, features]` or `[features, anchors]`; the
    /// latter is detected by having fewer rows than columns and fewer than 100
    /// rows. Empty output, which a model emits when nothing clears its own
    /// threshold, returns no boxes silently. Output too narrow to hold a box
    /// is logged and also returns no boxes.
    pub fn apply(
        &self,
        output: &Array2<f32>,
        letterbox: &LetterboxTransform,
        conf_threshold: f32,
        iou_threshold: f32,
    ) -> Vec<OrientedBox> {
        let (rows, cols) = output.dim();
        if rows == 0 || cols == 0 {
            return Vec::new();
        }
        let predictions: ArrayView2<f32> = if rows < cols && rows < 100 {
            output.t()
        } else {
            output.view()
        };

        let features = predictions.ncols();
        if features < 6 {
            tracing::warn!(
                "OBB output has {} features per prediction, need at least 6",
                features
            );
            return Vec::new();
        }

        let candidates = self.candidates(predictions, letterbox, conf_threshold);
        let kept = rotated_nms(candidates, iou_threshold);
        let deduped = self.deduplicate(kept);

        deduped
            .into_iter()
            .map(|c| {
                OrientedBox::new(c.corners(), c.score).with_text(self.config.class_label(c.class_id))
            })
            .collect()
    }

    fn candidates(
        &self,
        predictions: ArrayView2<f32>,
        letterbox: &LetterboxTransform,
        conf_threshold: f32,
    ) -> Vec<ObbCandidate> {
        let num_classes = predictions.ncols() - 5;
        let angle_col = predictions.ncols() - 1;

        predictions
            .rows()
            .into_iter()
            .filter_map(|row| {
                let (class_id, score) = (0..num_classes)
                    .map(|c| (c, row[4 + c]))
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))?;
                if !score.is_finite() || score <= conf_threshold {
                    return None;
                }
                let (cx, cy, w, h) = letterbox.scale_box(row[0], row[1], row[2], row[3]);
                let angle = row[angle_col];
                let finite = [cx, cy, w, h, angle].iter().all(|v| v.is_finite());
                if !finite || w <= 0.0 || h <= 0.0 {
                    return None;
                }
                Some(ObbCandidate {
                    cx,
                    cy,
                    w,
                    h,
                    angle,
                    score,
                    class_id,
                })
            })
            .collect()
    }

    /// Drops boxes that repeat an already kept, higher-scoring box.
    fn deduplicate(&self, mut candidates: Vec<ObbCandidate>) -> Vec<ObbCandidate> {
        sort_by_score(&mut candidates);
        let mut kept: Vec<(ObbCandidate, Aabb)> = Vec::with_capacity(candidates.len());
        for c in candidates {
            let aabb = OrientedBox::new(c.corners(), c.score).aabb();
            let duplicate = kept.iter().any(|(k, k_aabb)| {
                (k.class_id == c.class_id
                    && k.center().distance(&c.center()) < self.config.dedup_distance)
                    || k_aabb.iou(&aabb) > self.config.dedup_iou
            });
            if !duplicate {
                kept.push((c, aabb));
            }
        }
        kept.into_iter().map(|(c, _)| c).collect()
    }
}

fn sort_by_score(candidates: &mut [ObbCandidate]) {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Greedy class-agnostic suppression on rotated-polygon IoU.
fn rotated_nms(mut candidates: Vec<ObbCandidate>, iou_threshold: f32) -> Vec<ObbCandidate> {
    sort_by_score(&mut candidates);
    let polygons: Vec<[Point; 4]> = candidates.iter().map(ObbCandidate::corners).collect();
    let mut suppressed = vec![false; candidates.len()];
    let mut kept = Vec::new();

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(candidates[i]);
        for j in (i + 1)..candidates.len() {
            if !suppressed[j] && convex_iou(&polygons[i], &polygons[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    /// Rows of `[cx, cy, w, h, c0, c1, angle]`.
    fn output(rows: &[[f32; 7]]) -> Array2<f32> {
        Array2::from_shape_vec((rows.len(), 7), rows.iter().flatten().copied().collect()).unwrap()
    }

    fn identity() -> LetterboxTransform {
        LetterboxTransform::compute(640, 640, 640)
    }

    #[test]
    fn test_confidence_filter_and_labels() {
        let out = output(&[
            [100.0, 100.0, 80.0, 40.0, 0.9, 0.1, 0.0],
            [400.0, 400.0, 80.0, 40.0, 0.1, 0.3, 0.0],
            [300.0, 100.0, 80.0, 40.0, 0.2, 0.7, 0.0],
        ]);
        let boxes = ObbPostProcess::default().apply(&out, &identity(), 0.4, 0.6);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].text(), Some("balloon"));
        assert_eq!(boxes[1].text(), Some("qipao"));
        let aabb = boxes[0].aabb();
        assert!((aabb.x_min - 60.0).abs() < 1e-3 && (aabb.y_max - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_features_first_layout_is_transposed() {
        let mut rows = vec![
            [100.0, 100.0, 80.0, 40.0, 0.9, 0.1, 0.0],
            [300.0, 300.0, 80.0, 40.0, 0.8, 0.1, 0.0],
        ];
        rows.extend([[0.0; 7]; 10]);
        let features_first = output(&rows).t().to_owned();
        assert_eq!(features_first.dim(), (7, 12));
        let boxes = ObbPostProcess::default().apply(&features_first, &identity(), 0.5, 0.6);
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn test_rotated_nms_suppresses_overlap() {
        let out = output(&[
            [200.0, 200.0, 100.0, 30.0, 0.8, 0.0, 0.3],
            [202.0, 201.0, 100.0, 30.0, 0.9, 0.0, 0.3],
            [500.0, 500.0, 100.0, 30.0, 0.7, 0.0, 0.3],
        ]);
        let boxes = ObbPostProcess::default().apply(&out, &identity(), 0.5, 0.6);
        assert_eq!(boxes.len(), 2);
        assert!((boxes[0].score() - 0.9).abs() < 1e-6);
        assert!((boxes[1].score() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_crossing_boxes_pass_nms_but_are_deduplicated() {
        // A horizontal and a vertical bar 5px apart: low IoU, near-identical centers.
        let out = output(&[
            [300.0, 300.0, 100.0, 10.0, 0.9, 0.0, 0.0],
            [305.0, 300.0, 100.0, 10.0, 0.8, 0.0, FRAC_PI_2],
        ]);
        let post = ObbPostProcess::default();
        let boxes = post.apply(&out, &identity(), 0.5, 0.6);
        assert_eq!(boxes.len(), 1);

        // Different classes keep both.
        let out = output(&[
            [300.0, 300.0, 100.0, 10.0, 0.9, 0.0, 0.0],
            [305.0, 300.0, 100.0, 10.0, 0.0, 0.8, FRAC_PI_2],
        ]);
        assert_eq!(post.apply(&out, &identity(), 0.5, 0.6).len(), 2);
    }

    #[test]
    fn test_no_same_class_pair_closer_than_dedup_distance() {
        let mut rows = Vec::new();
        for i in 0..12 {
            let offset = i as f32 * 4.0;
            rows.push([100.0 + offset, 300.0, 12.0, 60.0, 0.5 + i as f32 * 0.01, 0.0, 0.0]);
        }
        let post = ObbPostProcess::default();
        let boxes = post.apply(&output(&rows), &identity(), 0.4, 0.9);
        for (i, a) in boxes.iter().enumerate() {
            for b in &boxes[i + 1..] {
                assert!(a.center().distance(&b.center()) >= post.config().dedup_distance);
            }
        }
    }

    #[test]
    fn test_letterbox_padding_is_removed() {
        // 1280x640 source: scale 0.5, 160px top padding.
        let lb = LetterboxTransform::compute(1280, 640, 640);
        assert_eq!(lb.pad_y, 160);
        let out = output(&[[320.0, 320.0, 100.0, 50.0, 0.9, 0.0, 0.0]]);
        let boxes = ObbPostProcess::default().apply(&out, &lb, 0.5, 0.6);
        let c = boxes[0].center();
        assert!((c.x - 640.0).abs() < 1e-3 && (c.y - 320.0).abs() < 1e-3);
        assert!((boxes[0].width() - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_unknown_class_label_and_narrow_output() {
        let cfg = ObbDecodeConfig {
            class_names: vec!["only".to_string()],
            ..Default::default()
        };
        assert_eq!(cfg.class_label(3), "class_3");
        let narrow = Array2::<f32>::zeros((200, 5));
        assert!(ObbPostProcess::default().apply(&narrow, &identity(), 0.1, 0.5).is_empty());
    }

    #[test]
    fn test_empty_output_in_either_layout_yields_no_boxes() {
        let post = ObbPostProcess::default();
        for shape in [(10, 0), (0, 10), (0, 0)] {
            let empty = Array2::<f32>::zeros(shape);
            assert!(post.apply(&empty, &identity(), 0.1, 0.5).is_empty(), "{shape:?}");
        }
    }
}
