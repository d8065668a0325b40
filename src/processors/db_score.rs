use super::DbPostProcess;
use crate::processors::geometry::{Point, ScanlineBuffer};
use itertools::Itertools;
use rayon::prelude::*;

/// Pixel rows and columns covered by a polygon's extent, clamped to the map.
#[derive(Debug, Clone, Copy)]
struct Region {
    start_y: usize,
    end_y: usize,
    start_x: usize,
    end_x: usize,
}

impl Region {
    fn covering(points: &[Point], height: usize, width: usize) -> Option<Self> {
        if height == 0 || width == 0 {
            return None;
        }
        let (min_x, max_x) = points.iter().map(|p| p.x).minmax().into_option()?;
        let (min_y, max_y) = points.iter().map(|p| p.y).minmax().into_option()?;
        let clamp_x = |v: f32| v.clamp(0.0, width as f32 - 1.0) as usize;
        let clamp_y = |v: f32| v.clamp(0.0, height as f32 - 1.0) as usize;
        Some(Self {
            start_y: clamp_y(min_y),
            end_y: clamp_y(max_y) + 1,
            start_x: clamp_x(min_x),
            end_x: clamp_x(max_x) + 1,
        })
    }

    fn pixels(&self) -> usize {
        (self.end_y - self.start_y) * (self.end_x - self.start_x)
    }
}

impl DbPostProcess {
    /// Mean probability of the pixels inside `polygon`.
    ///
    /// Large regions are scored row-parallel once they exceed the policy's pixel threshold.
    pub(super) fn box_score_fast(&self, pred: &ndarray::ArrayView2<f32>, polygon: &[Point]) -> f32 {
        let (height, width) = pred.dim();
        let Some(region) = Region::covering(polygon, height, width) else {
            return 0.0;
        };

        let score_row = |buffer: &mut ScanlineBuffer, y: usize| {
            buffer.process_scanline(y as f32 + 0.5, polygon, region.start_x, region.end_x, pred)
        };

        let (total_score, total_pixels) =
            if region.pixels() < self.parallel.postprocess_pixel_threshold {
                let mut buffer = ScanlineBuffer::new(polygon.len());
                (region.start_y..region.end_y)
                    .map(|y| score_row(&mut buffer, y))
                    .fold((0.0, 0), |(s, n), (ls, ln)| (s + ls, n + ln))
            } else {
                (region.start_y..region.end_y)
                    .into_par_iter()
                    .map(|y| score_row(&mut ScanlineBuffer::new(polygon.len()), y))
                    .reduce(|| (0.0, 0), |(s, n), (ls, ln)| (s + ls, n + ln))
            };

        if total_pixels > 0 {
            total_score / total_pixels as f32
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ParallelPolicy;
    use ndarray::Array2;

    fn square() -> Vec<Point> {
        vec![
            Point::new(2.0, 2.0),
            Point::new(12.0, 2.0),
            Point::new(12.0, 12.0),
            Point::new(2.0, 12.0),
        ]
    }

    #[test]
    fn test_score_is_mean_inside_polygon() {
        let mut pred = Array2::<f32>::zeros((20, 20));
        for y in 2..12 {
            for x in 2..12 {
                pred[[y, x]] = 0.8;
            }
        }
        let post = DbPostProcess::default();
        let score = post.box_score_fast(&pred.view(), &square());
        assert!((score - 0.8).abs() < 1e-5, "score {score}");
    }

    #[test]
    fn test_parallel_path_matches_sequential() {
        let pred = Array2::from_shape_fn((40, 40), |(y, x)| ((x + y) % 7) as f32 / 7.0);
        let seq = DbPostProcess::default();
        let par = DbPostProcess::default()
            .with_parallel_policy(ParallelPolicy::default().with_postprocess_pixel_threshold(1));
        let a = seq.box_score_fast(&pred.view(), &square());
        let b = par.box_score_fast(&pred.view(), &square());
        assert!((a - b).abs() < 1e-5);
    }
}
