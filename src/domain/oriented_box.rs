//! Oriented quadrilaterals shared by every detection stage.
//!
//! An [`OrientedBox`] is immutable once built. Its corners are normalized to
//! clockwise order starting at the top-left corner, and every derived quantity
//! (axis-aligned extent, area, aspect ratio) is computed from the corners on
//! demand. Operations that move a box return a new one.

use crate::processors::geometry::{Point, polygon_area};
use serde::Serialize;
use std::cmp::Ordering;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aabb {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl Aabb {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// True when the two boxes touch or intersect. Shared edges count as overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        !(self.x_max < other.x_min
            || self.x_min > other.x_max
            || self.y_max < other.y_min
            || self.y_min > other.y_max)
    }

    /// True when `other` lies fully inside `self`, boundaries included.
    pub fn contains(&self, other: &Aabb) -> bool {
        self.x_min <= other.x_min
            && self.y_min <= other.y_min
            && self.x_max >= other.x_max
            && self.y_max >= other.y_max
    }

    /// Intersection over union. Zero when the union is empty.
    pub fn iou(&self, other: &Aabb) -> f32 {
        let ix = (self.x_max.min(other.x_max) - self.x_min.max(other.x_min)).max(0.0);
        let iy = (self.y_max.min(other.y_max) - self.y_min.max(other.y_min)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Dominant text direction of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Four-cornered detection with a confidence score and optional text payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrientedBox {
    corners: [Point; 4],
    score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl OrientedBox {
    /// Builds a box from four corners given in any order.
    pub fn new(corners: [Point; 4], score: f32) -> Self {
        Self {
            corners: order_corners(corners),
            score,
            text: None,
        }
    }

    /// Builds an axis-aligned box.
    pub fn from_aabb(aabb: Aabb, score: f32) -> Self {
        Self::new(
            [
                Point::new(aabb.x_min, aabb.y_min),
                Point::new(aabb.x_max, aabb.y_min),
                Point::new(aabb.x_max, aabb.y_max),
                Point::new(aabb.x_min, aabb.y_max),
            ],
            score,
        )
    }

    /// Corners in clockwise order: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    /// Detector confidence in `[0, 1]`.
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Class label attached by the OBB detector, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Returns a copy carrying `text`.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Smallest axis-aligned box containing every corner.
    pub fn aabb(&self) -> Aabb {
        let mut aabb = Aabb::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for p in &self.corners {
            aabb.x_min = aabb.x_min.min(p.x);
            aabb.y_min = aabb.y_min.min(p.y);
            aabb.x_max = aabb.x_max.max(p.x);
            aabb.y_max = aabb.y_max.max(p.y);
        }
        aabb
    }

    /// Area of the axis-aligned extent. Filtering and merging both use this measure.
    pub fn area(&self) -> f32 {
        self.aabb().area()
    }

    /// Shoelace area of the quadrilateral itself.
    pub fn polygon_area(&self) -> f32 {
        polygon_area(&self.corners)
    }

    /// Mean of the four corners.
    pub fn center(&self) -> Point {
        let (sx, sy) = self
            .corners
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / 4.0, sy / 4.0)
    }

    /// Length between the midpoints of the left and right edges.
    pub fn width(&self) -> f32 {
        let [tl, tr, br, bl] = &self.corners;
        tl.midpoint(bl).distance(&tr.midpoint(br))
    }

    /// Length between the midpoints of the top and bottom edges.
    pub fn height(&self) -> f32 {
        let [tl, tr, br, bl] = &self.corners;
        tl.midpoint(tr).distance(&bl.midpoint(br))
    }

    /// `width / height`; infinite for a box with no height.
    pub fn aspect_ratio(&self) -> f32 {
        let height = self.height();
        if height <= f32::EPSILON {
            f32::INFINITY
        } else {
            self.width() / height
        }
    }

    pub fn orientation(&self) -> Orientation {
        if self.aspect_ratio() > 1.0 {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        }
    }

    /// Boxes with no area or non-finite coordinates cannot take part in
    /// ratio and IoU computations.
    pub fn is_degenerate(&self) -> bool {
        self.corners
            .iter()
            .any(|p| !p.x.is_finite() || !p.y.is_finite())
            || self.area() <= 0.0
            || self.polygon_area() <= f32::EPSILON
    }

    /// Returns a new box with every corner mapped through `f`.
    pub fn map_points(&self, f: impl Fn(Point) -> Point) -> Self {
        Self {
            corners: order_corners(self.corners.map(f)),
            score: self.score,
            text: self.text.clone(),
        }
    }

    /// Returns a new box with corners clamped into `[0, width] x [0, height]`.
    pub fn clamped(&self, width: f32, height: f32) -> Self {
        self.map_points(|p| Point::new(p.x.clamp(0.0, width), p.y.clamp(0.0, height)))
    }
}

/// Sorts corners clockwise (in image coordinates) around their centroid,
/// starting from the corner with the smallest `x + y`.
fn order_corners(corners: [Point; 4]) -> [Point; 4] {
    let cx = corners.iter().map(|p| p.x).sum::<f32>() / 4.0;
    let cy = corners.iter().map(|p| p.y).sum::<f32>() / 4.0;

    let mut sorted = corners;
    sorted.sort_by(|a, b| {
        let ta = (a.y - cy).atan2(a.x - cx);
        let tb = (b.y - cy).atan2(b.x - cx);
        ta.partial_cmp(&tb).unwrap_or(Ordering::Equal)
    });

    let start = (0..4)
        .min_by(|&i, &j| {
            let (a, b) = (&sorted[i], &sorted[j]);
            (a.x + a.y)
                .partial_cmp(&(b.x + b.y))
                .unwrap_or(Ordering::Equal)
                .then(a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
        })
        .unwrap_or(0);
    sorted.rotate_left(start);
    sorted
}
