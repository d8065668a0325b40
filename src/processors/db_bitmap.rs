use crate::domain::OrientedBox;
use crate::processors::geometry::{BoundingBox, Point};
use clipper2::{EndType, JoinType, Path as ClipperPath};
use image::GrayImage;
use imageproc::contours::{BorderType, Contour, find_contours};

use super::{DbPostProcess, DbThresholds};

impl DbPostProcess {
    pub(super) fn boxes_from_bitmap(
        &self,
        pred: &ndarray::ArrayView2<f32>,
        bitmap: &GrayImage,
        dest_width: u32,
        dest_height: u32,
        thresholds: &DbThresholds,
    ) -> Vec<OrientedBox> {
        let width_scale = dest_width as f32 / bitmap.width().max(1) as f32;
        let height_scale = dest_height as f32 / bitmap.height().max(1) as f32;

        let contours = find_contours::<u32>(bitmap);
        let mut boxes = Vec::new();

        for contour in contours
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .take(self.max_candidates)
        {
            let Some((mini_box, min_side)) = Self::mini_box_from_contour(&contour) else {
                continue;
            };
            if min_side < self.min_size {
                continue;
            }

            let score = self.box_score_fast(pred, &mini_box);
            if score < thresholds.box_thresh {
                continue;
            }

            let unclipped = Self::unclip(&mini_box, thresholds.unclip_ratio);
            if unclipped.is_empty() {
                continue;
            }
            let Some((expanded, sside)) = Self::mini_box(&unclipped) else {
                continue;
            };
            if sside < self.min_size + 2.0 {
                continue;
            }

            let scaled = expanded.map(|p| {
                Point::new(
                    (p.x * width_scale).round().clamp(0.0, dest_width as f32),
                    (p.y * height_scale).round().clamp(0.0, dest_height as f32),
                )
            });
            let candidate = OrientedBox::new(scaled, score);
            if !candidate.is_degenerate() {
                boxes.push(candidate);
            }
        }

        boxes
    }

    fn mini_box_from_contour(contour: &Contour<u32>) -> Option<([Point; 4], f32)> {
        let points: Vec<Point> = contour
            .points
            .iter()
            .map(|p| Point::new(p.x as f32, p.y as f32))
            .collect();
        let simplified = simplify_chain_points(&points);
        Self::mini_box(&simplified)
    }

    /// Minimum-area rectangle corners and its short side.
    fn mini_box(points: &[Point]) -> Option<([Point; 4], f32)> {
        if points.len() < 3 {
            return None;
        }
        let rect = BoundingBox::new(points.to_vec()).get_min_area_rect();
        let min_side = rect.min_side();
        if !min_side.is_finite() || min_side <= 0.0 {
            return None;
        }
        Some((rect.corners(), min_side))
    }

    /// Offsets the polygon outwards by `area * ratio / perimeter`.
    ///
    /// Returns no points when the polygon is degenerate or the offset splits it.
    fn unclip(points: &[Point; 4], unclip_ratio: f32) -> Vec<Point> {
        let bbox = BoundingBox::new(points.to_vec());
        let area = bbox.area() as f64;
        let perimeter = bbox.perimeter() as f64;
        if area <= f64::EPSILON || perimeter <= f64::EPSILON {
            return Vec::new();
        }
        let delta = area * unclip_ratio as f64 / perimeter;
        if delta.abs() <= f64::EPSILON {
            return points.to_vec();
        }

        let clipper_path: ClipperPath = points
            .iter()
            .map(|p| (p.x as f64, p.y as f64))
            .collect::<Vec<_>>()
            .into();
        let offset_paths = clipper_path.inflate(delta, JoinType::Round, EndType::Polygon, 2.0);
        if offset_paths.len() != 1 {
            return Vec::new();
        }
        let Some(path) = offset_paths.into_iter().next() else {
            return Vec::new();
        };

        let mut out: Vec<Point> = path
            .iter()
            .map(|pt| Point::new(pt.x() as f32, pt.y() as f32))
            .collect();
        if let (Some(first), Some(last)) = (out.first(), out.last())
            && out.len() > 1
            && (first.x - last.x).abs() < f32::EPSILON
            && (first.y - last.y).abs() < f32::EPSILON
        {
            out.pop();
        }
        if out.len() < 3 { Vec::new() } else { out }
    }
}

/// Keeps only the turning points of a traced pixel chain.
fn simplify_chain_points(points: &[Point]) -> Vec<Point> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let step = |v: f32| v.partial_cmp(&0.0).map_or(0i8, |o| o as i8);
    let simplified: Vec<Point> = (0..n)
        .filter_map(|i| {
            let prev = points[(i + n - 1) % n];
            let curr = points[i];
            let next = points[(i + 1) % n];
            let dir_prev = (step(curr.x - prev.x), step(curr.y - prev.y));
            let dir_next = (step(next.x - curr.x), step(next.y - curr.y));
            (dir_prev != dir_next).then_some(curr)
        })
        .collect();

    if simplified.len() < 3 {
        points.to_vec()
    } else {
        simplified
    }
}
