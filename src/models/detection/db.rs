//! DB (Differentiable Binarization) heat-map text detection model.
//!
//! Pure model wrapper: resizing and normalization, the ONNX forward pass,
//! and decoding of the probability map into boxes. Lifecycle and filtering
//! live in the detector layer.

use crate::core::errors::{DetectorError, ProcessingStage};
use crate::core::inference::OrtInfer;
use crate::domain::{DetectionParams, ProbabilityMask, RawDetection};
use crate::processors::filters::resize_mask;
use crate::processors::{DbPostProcess, DbThresholds, NormalizeImage};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use ndarray::{Array2, Array4, Axis, Ix2, s};

/// Model inputs must have sides divisible by this.
pub const DB_STRIDE: u32 = 32;

/// Output of [`DbModel::preprocess`].
#[derive(Debug, Clone)]
pub struct DbPreprocessed {
    /// `[1, 3, H, W]` with `H` and `W` multiples of [`DB_STRIDE`].
    pub tensor: Array4<f32>,
    /// Size of the resized image content inside the padded tensor.
    pub content: (u32, u32),
    /// Size of the source image.
    pub source: (u32, u32),
}

/// Resizes so the long side equals `detect_size`, then zero-pads bottom/right to the stride.
///
/// Returns the padded image and the size of the resized content.
pub fn resize_to_stride(img: &RgbImage, detect_size: u32) -> (RgbImage, (u32, u32)) {
    let (w, h) = img.dimensions();
    let long = w.max(h).max(1) as f32;
    let scale = detect_size as f32 / long;
    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);

    let resized = if (new_w, new_h) == (w, h) {
        img.clone()
    } else {
        imageops::resize(img, new_w, new_h, FilterType::Triangle)
    };

    let pad_w = new_w.div_ceil(DB_STRIDE) * DB_STRIDE;
    let pad_h = new_h.div_ceil(DB_STRIDE) * DB_STRIDE;
    if (pad_w, pad_h) == (new_w, new_h) {
        return (resized, (new_w, new_h));
    }
    let mut canvas = RgbImage::new(pad_w, pad_h);
    imageops::replace(&mut canvas, &resized, 0, 0);
    (canvas, (new_w, new_h))
}

/// DB text detection model.
#[derive(Debug)]
pub struct DbModel {
    inference: OrtInfer,
    normalizer: NormalizeImage,
    postprocess: DbPostProcess,
}

impl DbModel {
    /// Wraps a loaded session with the DB preprocessing and decoder.
    pub fn new(inference: OrtInfer, postprocess: DbPostProcess) -> Self {
        Self {
            inference,
            normalizer: NormalizeImage::symmetric(),
            postprocess,
        }
    }

    pub fn model_name(&self) -> &str {
        self.inference.model_name()
    }

    /// Resizes, pads and normalizes `image` into a model tensor.
    pub fn preprocess(
        &self,
        image: &RgbImage,
        detect_size: u32,
    ) -> Result<DbPreprocessed, DetectorError> {
        let (padded, content) = resize_to_stride(image, detect_size);
        let tensor = self.normalizer.normalize_to(&padded)?;
        Ok(DbPreprocessed {
            tensor,
            content,
            source: image.dimensions(),
        })
    }

    /// Runs the forward pass and returns the probability map of the padded input.
    pub fn infer(&self, pre: &DbPreprocessed) -> Result<Array2<f32>, DetectorError> {
        let outputs = self.inference.infer(&pre.tensor)?;
        let (name, output) = outputs.into_iter().next().ok_or_else(|| {
            DetectorError::InvalidInput {
                message: format!("model '{}' returned no outputs", self.model_name()),
            }
        })?;
        probability_map(output.into_array_f32()?).map_err(|e| {
            DetectorError::processing_error(
                ProcessingStage::PostProcessing,
                format!("output '{name}' is not a probability map"),
                e,
            )
        })
    }

    /// Decodes a probability map into boxes in source image coordinates.
    pub fn postprocess(
        &self,
        prob: &Array2<f32>,
        pre: &DbPreprocessed,
        params: &DetectionParams,
    ) -> RawDetection {
        let (src_w, src_h) = pre.source;
        let content_w = (pre.content.0 as usize).min(prob.ncols());
        let content_h = (pre.content.1 as usize).min(prob.nrows());
        let valid = prob.slice(s![..content_h, ..content_w]);

        let thresholds = DbThresholds::new(
            params.text_threshold,
            params.box_threshold,
            params.unclip_ratio,
        );
        let out = self.postprocess.apply(&valid, src_w, src_h, &thresholds);

        let mask_data: Vec<f32> = valid.iter().copied().collect();
        let raw_mask = ProbabilityMask::from_raw(content_w as u32, content_h as u32, mask_data)
            .map(|m| resize_mask(m, src_w, src_h));
        let debug_mask = params.verbose.then(|| {
            let bitmap: GrayImage = out.bitmap;
            if bitmap.dimensions() == (src_w, src_h) {
                bitmap
            } else {
                imageops::resize(&bitmap, src_w, src_h, FilterType::Nearest)
            }
        });

        RawDetection {
            boxes: out.boxes,
            raw_mask,
            debug_mask,
        }
    }

    /// Preprocess, infer and postprocess in one call.
    pub fn forward(
        &self,
        image: &RgbImage,
        params: &DetectionParams,
    ) -> Result<RawDetection, DetectorError> {
        let pre = self.preprocess(image, params.detect_size)?;
        let prob = self.infer(&pre)?;
        let raw = self.postprocess(&prob, &pre, params);
        tracing::debug!(
            "{}: {} boxes from {}x{} map",
            self.model_name(),
            raw.boxes.len(),
            prob.ncols(),
            prob.nrows()
        );
        Ok(raw)
    }
}

/// First channel of the first batch item, for `[N, C, H, W]`, `[N, H, W]` or `[H, W]` output.
fn probability_map(output: ndarray::ArrayD<f32>) -> Result<Array2<f32>, ndarray::ShapeError> {
    let mut map = output;
    while map.ndim() > 2 {
        map = map.index_axis_move(Axis(0), 0);
    }
    map.into_dimensionality::<Ix2>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_resize_to_stride_pads_to_multiple_of_32() {
        let img = RgbImage::from_pixel(300, 200, Rgb([200, 200, 200]));
        let (padded, content) = resize_to_stride(&img, 1000);
        assert_eq!(content, (1000, 667));
        assert_eq!(padded.dimensions(), (1024, 672));
        assert_eq!(padded.get_pixel(1010, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_resize_to_stride_keeps_aligned_image() {
        let img = RgbImage::new(64, 32);
        let (padded, content) = resize_to_stride(&img, 64);
        assert_eq!(content, (64, 32));
        assert_eq!(padded.dimensions(), (64, 32));
    }

    #[test]
    fn test_probability_map_takes_first_channel() {
        let data: Vec<f32> = (0..2 * 3 * 4).map(|v| v as f32).collect();
        let output = ArrayD::from_shape_vec(IxDyn(&[1, 2, 3, 4]), data).unwrap();
        let map = probability_map(output).unwrap();
        assert_eq!(map.dim(), (3, 4));
        assert_eq!(map[[2, 3]], 11.0);
    }
}
