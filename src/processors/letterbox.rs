//! Aspect-preserving resize onto a fixed square canvas.

use crate::processors::geometry::Point;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Gray used to fill the padded border.
pub const LETTERBOX_FILL: u8 = 114;

/// Maps between an image and the square model input it was letterboxed into.
///
/// Created per inference call and consumed when decoding that call's output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    /// Uniform scale applied to the source image.
    pub scale: f32,
    /// Left padding in model pixels.
    pub pad_x: u32,
    /// Top padding in model pixels.
    pub pad_y: u32,
    /// Side of the square model input.
    pub target: u32,
    /// Width of the image before letterboxing.
    pub src_width: u32,
    /// Height of the image before letterboxing.
    pub src_height: u32,
}

impl LetterboxTransform {
    /// Computes the largest scale that fits `src_width x src_height` inside `target x target`.
    pub fn compute(src_width: u32, src_height: u32, target: u32) -> Self {
        let w = src_width.max(1) as f32;
        let h = src_height.max(1) as f32;
        let s = target as f32;
        let scale = (s / h).min(s / w);

        let (new_w, new_h) = Self::scaled_dims(w, h, scale, target);
        // The 0.1 bias rounds exact halves down so the leftover pixel lands on the far side.
        let pad_x = ((s - new_w as f32) / 2.0 - 0.1).round().max(0.0) as u32;
        let pad_y = ((s - new_h as f32) / 2.0 - 0.1).round().max(0.0) as u32;

        Self {
            scale,
            pad_x,
            pad_y,
            target,
            src_width,
            src_height,
        }
    }

    fn scaled_dims(w: f32, h: f32, scale: f32, target: u32) -> (u32, u32) {
        let new_w = ((w * scale).round() as u32).clamp(1, target.max(1));
        let new_h = ((h * scale).round() as u32).clamp(1, target.max(1));
        (new_w, new_h)
    }

    /// Size of the resized image before padding.
    pub fn resized_dims(&self) -> (u32, u32) {
        Self::scaled_dims(
            self.src_width.max(1) as f32,
            self.src_height.max(1) as f32,
            self.scale,
            self.target,
        )
    }

    /// Resizes `img` and centers it on a `target x target` canvas filled with [`LETTERBOX_FILL`].
    pub fn apply(&self, img: &RgbImage) -> RgbImage {
        let (new_w, new_h) = self.resized_dims();
        let resized = if (new_w, new_h) == img.dimensions() {
            img.clone()
        } else {
            imageops::resize(img, new_w, new_h, FilterType::Triangle)
        };

        let mut canvas = RgbImage::from_pixel(self.target, self.target, Rgb([LETTERBOX_FILL; 3]));
        imageops::overlay(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Model-space point to image space, without clamping.
    pub fn to_image(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.pad_x as f32) / self.scale,
            (p.y - self.pad_y as f32) / self.scale,
        )
    }

    /// Image-space point to model space.
    pub fn to_model(&self, p: Point) -> Point {
        Point::new(
            p.x * self.scale + self.pad_x as f32,
            p.y * self.scale + self.pad_y as f32,
        )
    }

    /// Rescales a model-space `(cx, cy, w, h)` into image space.
    ///
    /// The center is clamped into the source image; the extents are only rescaled.
    pub fn scale_box(&self, cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
        let c = self.to_image(Point::new(cx, cy));
        (
            c.x.clamp(0.0, self.src_width as f32),
            c.y.clamp(0.0, self.src_height as f32),
            w / self.scale,
            h / self.scale,
        )
    }
}
