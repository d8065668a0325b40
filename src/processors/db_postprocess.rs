//! Post-processing for DB (Differentiable Binarization) heat-map detectors.
//!
//! [`DbPostProcess`] turns a probability map into oriented boxes: binarize,
//! trace contours, fit minimum-area rectangles, score them against the map,
//! expand them by polygon offsetting and scale them into image space.
//! Contour handling and scoring live in helper modules next to this file.

#[path = "db_bitmap.rs"]
mod db_bitmap;
#[path = "db_score.rs"]
mod db_score;

use crate::core::config::ParallelPolicy;
use crate::domain::OrientedBox;
use image::{GrayImage, Luma};
use ndarray::ArrayView2;

/// Per-call thresholds for DB post-processing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbThresholds {
    /// Pixel probability above which the bitmap is set.
    pub thresh: f32,
    /// Minimum mean probability inside a candidate box.
    pub box_thresh: f32,
    /// Expansion ratio for candidate boxes.
    pub unclip_ratio: f32,
}

impl DbThresholds {
    pub fn new(thresh: f32, box_thresh: f32, unclip_ratio: f32) -> Self {
        Self {
            thresh,
            box_thresh,
            unclip_ratio,
        }
    }
}

/// Boxes plus the bitmap they were traced from.
#[derive(Debug, Clone)]
pub struct DbOutput {
    /// Boxes in destination image coordinates.
    pub boxes: Vec<OrientedBox>,
    /// Thresholded map at model resolution, 255 for text pixels.
    pub bitmap: GrayImage,
}

/// Post-processor for DB heat maps.
#[derive(Debug, Clone)]
pub struct DbPostProcess {
    /// Maximum number of contours considered (default: 1000).
    pub max_candidates: usize,
    /// Minimum short side, in map pixels, of a candidate box.
    pub min_size: f32,
    /// Controls when box scoring runs on the rayon pool.
    pub parallel: ParallelPolicy,
}

impl Default for DbPostProcess {
    fn default() -> Self {
        Self {
            max_candidates: 1000,
            min_size: 3.0,
            parallel: ParallelPolicy::default(),
        }
    }
}

impl DbPostProcess {
    pub fn new(max_candidates: usize, min_size: f32) -> Self {
        Self {
            max_candidates,
            min_size,
            ..Default::default()
        }
    }

    /// Replaces the parallel policy.
    pub fn with_parallel_policy(mut self, parallel: ParallelPolicy) -> Self {
        self.parallel = parallel;
        self
    }

    /// Decodes `pred` into boxes in a `dest_width x dest_height` image.
    ///
    /// `pred` must cover exactly the image content, without stride padding.
    pub fn apply(
        &self,
        pred: &ArrayView2<f32>,
        dest_width: u32,
        dest_height: u32,
        thresholds: &DbThresholds,
    ) -> DbOutput {
        let (height, width) = pred.dim();
        tracing::debug!(
            "DbPostProcess: pred {}x{}, dest {}x{}",
            width,
            height,
            dest_width,
            dest_height
        );

        let bitmap = GrayImage::from_fn(width as u32, height as u32, |x, y| {
            if pred[[y as usize, x as usize]] > thresholds.thresh {
                Luma([255])
            } else {
                Luma([0])
            }
        });

        let boxes = self.boxes_from_bitmap(pred, &bitmap, dest_width, dest_height, thresholds);
        DbOutput { boxes, bitmap }
    }
}
