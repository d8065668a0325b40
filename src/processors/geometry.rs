//! Geometric primitives for detection post-processing.
//!
//! Points, polygons, minimum-area rectangles, convex polygon clipping for
//! rotated IoU, and the scanline rasterizer used to score DB boxes.

use imageproc::contours::Contour;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use std::f32::consts::PI;

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    /// X-coordinate of the point.
    pub x: f32,
    /// Y-coordinate of the point.
    pub y: f32,
}

impl Point {
    /// Creates a new point with the given coordinates.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[inline]
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Midpoint between `self` and `other`.
    #[inline]
    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Twice the signed area of a polygon; positive when counter-clockwise in a y-up frame.
pub fn signed_area(points: &[Point]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    area / 2.0
}

/// Area of a simple polygon (shoelace formula).
pub fn polygon_area(points: &[Point]) -> f32 {
    signed_area(points).abs()
}

/// Area of the intersection of two convex polygons.
///
/// Uses Sutherland–Hodgman clipping of `subject` against every edge of `clip`.
/// Both polygons may be given in either winding order.
pub fn convex_intersection_area(subject: &[Point], clip: &[Point]) -> f32 {
    if subject.len() < 3 || clip.len() < 3 {
        return 0.0;
    }

    let mut clip = clip.to_vec();
    if signed_area(&clip) < 0.0 {
        clip.reverse();
    }

    let mut output = subject.to_vec();
    let n = clip.len();
    for i in 0..n {
        if output.is_empty() {
            break;
        }
        let edge_start = clip[i];
        let edge_end = clip[(i + 1) % n];
        let input = std::mem::take(&mut output);

        let inside = |p: &Point| cross(&edge_start, &edge_end, p) >= 0.0;

        for k in 0..input.len() {
            let current = input[k];
            let previous = input[(k + input.len() - 1) % input.len()];
            let current_in = inside(&current);
            let previous_in = inside(&previous);

            if current_in {
                if !previous_in {
                    if let Some(p) = line_intersection(&previous, &current, &edge_start, &edge_end)
                    {
                        output.push(p);
                    }
                }
                output.push(current);
            } else if previous_in {
                if let Some(p) = line_intersection(&previous, &current, &edge_start, &edge_end) {
                    output.push(p);
                }
            }
        }
    }

    polygon_area(&output)
}

/// Intersection over union of two convex polygons.
pub fn convex_iou(a: &[Point], b: &[Point]) -> f32 {
    let inter = convex_intersection_area(a, b);
    if inter <= 0.0 {
        return 0.0;
    }
    let union = polygon_area(a) + polygon_area(b) - inter;
    if union <= f32::EPSILON {
        0.0
    } else {
        (inter / union).clamp(0.0, 1.0)
    }
}

/// Cross product of `(b - a) x (p - a)`.
#[inline]
fn cross(a: &Point, b: &Point, p: &Point) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Intersection of segment `p1p2` with the infinite line through `q1q2`.
fn line_intersection(p1: &Point, p2: &Point, q1: &Point, q2: &Point) -> Option<Point> {
    let d1x = p2.x - p1.x;
    let d1y = p2.y - p1.y;
    let d2x = q2.x - q1.x;
    let d2y = q2.y - q1.y;
    let denom = d1x * d2y - d1y * d2x;
    if denom.abs() < f32::EPSILON {
        return None;
    }
    let t = ((q1.x - p1.x) * d2y - (q1.y - p1.y) * d2x) / denom;
    Some(Point::new(p1.x + t * d1x, p1.y + t * d1y))
}

/// A polygon represented by a collection of points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    /// The points that define the polygon.
    pub points: Vec<Point>,
}

impl BoundingBox {
    /// Creates a new bounding box from a vector of points.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Creates an axis-aligned rectangle from corner coordinates.
    pub fn from_coords(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(vec![
            Point::new(x1, y1),
            Point::new(x2, y1),
            Point::new(x2, y2),
            Point::new(x1, y2),
        ])
    }

    /// Creates a bounding box from a contour.
    pub fn from_contour(contour: &Contour<u32>) -> Self {
        let points = contour
            .points
            .iter()
            .map(|p| Point::new(p.x as f32, p.y as f32))
            .collect();
        Self { points }
    }

    /// Calculates the area of the polygon using the shoelace formula.
    pub fn area(&self) -> f32 {
        polygon_area(&self.points)
    }

    /// Calculates the perimeter of the polygon.
    pub fn perimeter(&self) -> f32 {
        let n = self.points.len();
        (0..n)
            .map(|i| self.points[i].distance(&self.points[(i + 1) % n]))
            .sum()
    }

    /// Returns `(x_min, y_min, x_max, y_max)`, or `None` when there are no points.
    pub fn extent(&self) -> Option<(f32, f32, f32, f32)> {
        let (x_min, x_max) = self.points.iter().map(|p| p.x).minmax().into_option()?;
        let (y_min, y_max) = self.points.iter().map(|p| p.y).minmax().into_option()?;
        Some((x_min, y_min, x_max, y_max))
    }

    /// Computes the convex hull of the polygon using Graham's scan.
    ///
    /// Returns a clone when there are fewer than 3 points.
    fn convex_hull(&self) -> BoundingBox {
        if self.points.len() < 3 {
            return self.clone();
        }

        let mut points = self.points.clone();

        // Lowest y (then lowest x) is the pivot.
        let mut start_idx = 0;
        for i in 1..points.len() {
            if points[i].y < points[start_idx].y
                || (points[i].y == points[start_idx].y && points[i].x < points[start_idx].x)
            {
                start_idx = i;
            }
        }
        points.swap(0, start_idx);
        let start_point = points[0];

        points[1..].sort_by(|a, b| {
            let turn = cross(&start_point, a, b);
            if turn == 0.0 {
                let dist_a = start_point.distance(a);
                let dist_b = start_point.distance(b);
                dist_a
                    .partial_cmp(&dist_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
            } else if turn > 0.0 {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            }
        });

        let mut hull: Vec<Point> = Vec::new();
        for point in points {
            while hull.len() > 1 && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], &point) <= 0.0
            {
                hull.pop();
            }
            hull.push(point);
        }

        BoundingBox::new(hull)
    }

    /// Computes the minimum area rectangle enclosing the polygon.
    ///
    /// Uses rotating calipers over the convex hull. Degenerate hulls fall back
    /// to the axis-aligned extent; an empty polygon yields a zero rectangle.
    pub fn get_min_area_rect(&self) -> MinAreaRect {
        let Some((x_min, y_min, x_max, y_max)) = self.extent() else {
            return MinAreaRect::default();
        };

        let hull = self.convex_hull();
        let hull_points = &hull.points;
        if hull_points.len() < 3 {
            return MinAreaRect {
                center: Point::new((x_min + x_max) / 2.0, (y_min + y_max) / 2.0),
                width: x_max - x_min,
                height: y_max - y_min,
                angle: 0.0,
            };
        }

        let mut min_area = f32::MAX;
        let mut min_rect = MinAreaRect::default();

        let n = hull_points.len();
        for i in 0..n {
            let origin = hull_points[i];
            let edge_x = hull_points[(i + 1) % n].x - origin.x;
            let edge_y = hull_points[(i + 1) % n].y - origin.y;
            let edge_length = (edge_x * edge_x + edge_y * edge_y).sqrt();
            if edge_length < f32::EPSILON {
                continue;
            }

            let nx = edge_x / edge_length;
            let ny = edge_y / edge_length;
            let (px, py) = (-ny, nx);

            let mut min_n = f32::MAX;
            let mut max_n = f32::MIN;
            let mut min_p = f32::MAX;
            let mut max_p = f32::MIN;
            for point in hull_points {
                let dx = point.x - origin.x;
                let dy = point.y - origin.y;
                let proj_n = nx * dx + ny * dy;
                let proj_p = px * dx + py * dy;
                min_n = min_n.min(proj_n);
                max_n = max_n.max(proj_n);
                min_p = min_p.min(proj_p);
                max_p = max_p.max(proj_p);
            }

            let width = max_n - min_n;
            let height = max_p - min_p;
            let area = width * height;
            if area < min_area {
                min_area = area;
                let center_n = (min_n + max_n) / 2.0;
                let center_p = (min_p + max_p) / 2.0;
                min_rect = MinAreaRect {
                    center: Point::new(
                        origin.x + center_n * nx + center_p * px,
                        origin.y + center_n * ny + center_p * py,
                    ),
                    width,
                    height,
                    angle: f32::atan2(ny, nx) * 180.0 / PI,
                };
            }
        }

        min_rect
    }
}

/// A rectangle with minimum area that encloses a shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinAreaRect {
    /// The center point of the rectangle.
    pub center: Point,
    /// Extent along the rectangle's rotated x axis.
    pub width: f32,
    /// Extent along the rectangle's rotated y axis.
    pub height: f32,
    /// The rotation angle of the rectangle in degrees.
    pub angle: f32,
}

impl MinAreaRect {
    /// The four corners, unordered beyond following the rectangle's perimeter.
    pub fn corners(&self) -> [Point; 4] {
        let cos_a = (self.angle * PI / 180.0).cos();
        let sin_a = (self.angle * PI / 180.0).sin();
        let w_2 = self.width / 2.0;
        let h_2 = self.height / 2.0;

        [(-w_2, -h_2), (w_2, -h_2), (w_2, h_2), (-w_2, h_2)].map(|(x, y)| {
            Point::new(
                x * cos_a - y * sin_a + self.center.x,
                x * sin_a + y * cos_a + self.center.y,
            )
        })
    }

    /// Gets the length of the shorter side of the rectangle.
    pub fn min_side(&self) -> f32 {
        self.width.min(self.height)
    }
}

/// Reusable buffer for rasterizing a polygon one scanline at a time.
pub(crate) struct ScanlineBuffer {
    intersections: Vec<f32>,
}

impl ScanlineBuffer {
    pub(crate) fn new(max_polygon_points: usize) -> Self {
        Self {
            intersections: Vec::with_capacity(max_polygon_points),
        }
    }

    /// Sums `pred` over the pixels of row `y` that lie inside `polygon`.
    ///
    /// # Returns
    ///
    /// `(accumulated score, pixel count)` for the row.
    pub(crate) fn process_scanline(
        &mut self,
        y: f32,
        polygon: &[Point],
        start_x: usize,
        end_x: usize,
        pred: &ndarray::ArrayView2<f32>,
    ) -> (f32, usize) {
        self.intersections.clear();

        let n = polygon.len();
        for i in 0..n {
            let p1 = &polygon[i];
            let p2 = &polygon[(i + 1) % n];
            if ((p1.y <= y && y < p2.y) || (p2.y <= y && y < p1.y))
                && (p2.y - p1.y).abs() > f32::EPSILON
            {
                self.intersections
                    .push(p1.x + (y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y));
            }
        }

        self.intersections
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let row = y as usize;
        if row >= pred.shape()[0] {
            return (0.0, 0);
        }

        let mut line_score = 0.0;
        let mut line_pixels = 0;
        for chunk in self.intersections.chunks(2) {
            if let [left, right] = chunk {
                let x1 = left.max(start_x as f32) as usize;
                let x2 = (right.min(end_x as f32) as usize).min(pred.shape()[1]);
                for x in x1..x2 {
                    line_score += pred[[row, x]];
                    line_pixels += 1;
                }
            }
        }

        (line_score, line_pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32, y: f32, side: f32) -> Vec<Point> {
        BoundingBox::from_coords(x, y, x + side, y + side).points
    }

    #[test]
    fn test_polygon_area_ignores_winding() {
        let mut pts = square(0.0, 0.0, 10.0);
        assert!((polygon_area(&pts) - 100.0).abs() < 1e-4);
        pts.reverse();
        assert!((polygon_area(&pts) - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_convex_intersection_of_offset_squares() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 5.0, 10.0);
        assert!((convex_intersection_area(&a, &b) - 25.0).abs() < 1e-3);
        // 25 / (100 + 100 - 25)
        assert!((convex_iou(&a, &b) - 25.0 / 175.0).abs() < 1e-4);
    }

    #[test]
    fn test_convex_iou_disjoint_and_identical() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(20.0, 20.0, 5.0);
        assert_eq!(convex_iou(&a, &b), 0.0);
        assert!((convex_iou(&a, &a) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_convex_iou_rotated_diamond_inside_square() {
        // Diamond inscribed in a 10x10 square has half its area.
        let sq = square(0.0, 0.0, 10.0);
        let diamond = vec![
            Point::new(5.0, 0.0),
            Point::new(10.0, 5.0),
            Point::new(5.0, 10.0),
            Point::new(0.0, 5.0),
        ];
        assert!((convex_intersection_area(&sq, &diamond) - 50.0).abs() < 1e-3);
        assert!((convex_iou(&sq, &diamond) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_min_area_rect_of_rotated_rectangle() {
        let rect = MinAreaRect {
            center: Point::new(50.0, 50.0),
            width: 40.0,
            height: 10.0,
            angle: 30.0,
        };
        let fitted = BoundingBox::new(rect.corners().to_vec()).get_min_area_rect();
        let (long, short) = if fitted.width > fitted.height {
            (fitted.width, fitted.height)
        } else {
            (fitted.height, fitted.width)
        };
        assert!((long - 40.0).abs() < 1e-2, "long side {long}");
        assert!((short - 10.0).abs() < 1e-2, "short side {short}");
        assert!((fitted.center.x - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_min_area_rect_degenerate_line() {
        let line = BoundingBox::new(vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
        ]);
        let rect = line.get_min_area_rect();
        assert_eq!(rect.min_side(), 0.0);
        assert!(BoundingBox::new(Vec::new()).extent().is_none());
    }

    #[test]
    fn test_scanline_counts_pixels_inside_polygon() {
        let pred = ndarray::Array2::<f32>::ones((10, 10));
        let poly = square(2.0, 2.0, 4.0);
        let mut buffer = ScanlineBuffer::new(poly.len());
        let (score, pixels) = buffer.process_scanline(3.5, &poly, 0, 10, &pred.view());
        assert_eq!(pixels, 4);
        assert!((score - 4.0).abs() < 1e-6);
        let (_, outside) = buffer.process_scanline(8.5, &poly, 0, 10, &pred.view());
        assert_eq!(outside, 0);
    }
}
