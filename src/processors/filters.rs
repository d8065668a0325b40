//! Reversible preprocessing applied around a detector.
//!
//! Filters run in a fixed order before detection: rotate, border, invert,
//! gamma. Only rotate and border move pixels, so only those two have an
//! inverse. [`AppliedFilters`] records what was done so the detector output
//! can be mapped back onto the original image.

use crate::domain::{DetectionParams, OrientedBox, ProbabilityMask, RawDetection};
use crate::processors::geometry::Point;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Pixel, RgbImage};
use tracing::debug;

/// Images whose shorter side is below this get padded to a square.
pub const MIN_DETECT_SIDE: u32 = 400;

/// Which filters to run. Built from [`DetectionParams`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterChain {
    pub rotate: bool,
    pub invert: bool,
    pub gamma_correct: bool,
}

/// Record of a filter pass, needed to undo its geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedFilters {
    /// Size of the image handed to [`FilterChain::apply`].
    pub original: (u32, u32),
    /// Size after rotation and before padding.
    pub working: (u32, u32),
    /// Padded size when border padding was applied.
    pub padded: Option<(u32, u32)>,
    /// Whether the image was rotated 90 degrees clockwise.
    pub rotated: bool,
}

impl FilterChain {
    pub fn from_params(params: &DetectionParams) -> Self {
        Self {
            rotate: params.rotate,
            invert: params.invert,
            gamma_correct: params.gamma_correct,
        }
    }

    /// Runs the chain and returns the filtered image with its reversal record.
    pub fn apply(&self, img: &RgbImage) -> (RgbImage, AppliedFilters) {
        let original = img.dimensions();

        let mut out = if self.rotate {
            debug!("rotating input by 90 degrees");
            imageops::rotate90(img)
        } else {
            img.clone()
        };
        let working = out.dimensions();

        let padded = add_border(&out, MIN_DETECT_SIDE);
        let padded_dims = padded.as_ref().map(|p| p.dimensions());
        if let Some(p) = padded {
            debug!(
                "padded {}x{} to {}x{}",
                working.0,
                working.1,
                p.width(),
                p.height()
            );
            out = p;
        }

        if self.invert {
            debug!("inverting colors");
            imageops::invert(&mut out);
        }
        if self.gamma_correct {
            apply_gamma(&mut out);
        }

        (
            out,
            AppliedFilters {
                original,
                working,
                padded: padded_dims,
                rotated: self.rotate,
            },
        )
    }
}

/// Zero-pads bottom and right to a square of side `max(w, h, min_side)`.
///
/// Returns `None` when the shorter side already reaches `min_side`.
pub fn add_border(img: &RgbImage, min_side: u32) -> Option<RgbImage> {
    let (w, h) = img.dimensions();
    if w.min(h) >= min_side {
        return None;
    }
    let side = w.max(h).max(min_side);
    let mut canvas = RgbImage::new(side, side);
    imageops::replace(&mut canvas, img, 0, 0);
    Some(canvas)
}

/// Power-law correction pulling mean luminance towards mid-gray.
///
/// `out = clamp(p ^ (ln 127.5 / ln mean), 0, 255)` on raw 8-bit values.
/// Images with a mean at or below 1 are left untouched.
pub fn apply_gamma(img: &mut RgbImage) {
    let n = (img.width() as f64) * (img.height() as f64);
    if n == 0.0 {
        return;
    }
    let sum: f64 = img
        .pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .sum();
    let mean = sum / n;
    if mean <= 1.0 {
        return;
    }
    let gamma = 127.5f64.ln() / mean.ln();
    if !gamma.is_finite() {
        return;
    }
    debug!("gamma correction: mean {:.2}, gamma {:.3}", mean, gamma);

    let lut: Vec<u8> = (0..=255u32)
        .map(|v| (v as f64).powf(gamma).clamp(0.0, 255.0) as u8)
        .collect();
    for p in img.pixels_mut() {
        p.apply(|c| lut[c as usize]);
    }
}

impl AppliedFilters {
    /// Undoes border padding.
    ///
    /// Masks are resized to the filtered size and cropped to the pre-padding
    /// size. Boxes entirely inside the padding are dropped, the rest are
    /// clamped to the pre-padding size, and boxes left without area are dropped.
    pub fn remove_border(&self, raw: RawDetection) -> RawDetection {
        let (w, h) = self.working;
        let filtered = self.padded.unwrap_or(self.working);

        let before = raw.boxes.len();
        let boxes: Vec<OrientedBox> = raw
            .boxes
            .into_iter()
            .filter(|b| {
                let aabb = b.aabb();
                !(aabb.x_min >= w as f32 && aabb.y_min >= h as f32)
            })
            .map(|b| b.clamped(w as f32, h as f32))
            .filter(|b| !b.is_degenerate())
            .collect();
        if boxes.len() != before {
            debug!("border removal dropped {} boxes", before - boxes.len());
        }

        RawDetection {
            boxes,
            raw_mask: raw
                .raw_mask
                .map(|m| fit_and_crop(m, filtered, self.working)),
            debug_mask: raw
                .debug_mask
                .map(|m| fit_and_crop(m, filtered, self.working)),
        }
    }

    /// Undoes the 90 degree rotation on masks and box corners.
    pub fn remove_rotation(&self, raw: RawDetection) -> RawDetection {
        if !self.rotated {
            return raw;
        }
        let orig_h = self.original.1 as f32;
        RawDetection {
            boxes: raw
                .boxes
                .iter()
                .map(|b| b.map_points(|p| Point::new(p.y, orig_h - p.x)))
                .collect(),
            raw_mask: raw.raw_mask.map(|m| imageops::rotate270(&m)),
            debug_mask: raw.debug_mask.map(|m: GrayImage| imageops::rotate270(&m)),
        }
    }

    /// Border removal followed by rotation removal.
    pub fn reverse(&self, raw: RawDetection) -> RawDetection {
        self.remove_rotation(self.remove_border(raw))
    }
}

fn fit_and_crop<P>(
    mask: ImageBuffer<P, Vec<P::Subpixel>>,
    filtered: (u32, u32),
    crop: (u32, u32),
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    let mask = if mask.dimensions() == filtered {
        mask
    } else {
        imageops::resize(&mask, filtered.0, filtered.1, FilterType::Triangle)
    };
    if mask.dimensions() == crop {
        mask
    } else {
        imageops::crop_imm(&mask, 0, 0, crop.0, crop.1).to_image()
    }
}

/// Resizes a probability mask to `width x height` when it differs.
pub fn resize_mask(mask: ProbabilityMask, width: u32, height: u32) -> ProbabilityMask {
    if mask.dimensions() == (width, height) {
        mask
    } else {
        imageops::resize(&mask, width, height, FilterType::Triangle)
    }
}
