//! YOLO oriented-bounding-box detection model.

use crate::core::errors::DetectorError;
use crate::core::inference::OrtInfer;
use crate::domain::OrientedBox;
use crate::processors::{LetterboxTransform, NormalizeImage, ObbDecodeConfig, ObbPostProcess};
use image::RgbImage;
use ndarray::{Array2, Array4};

/// YOLO OBB model: letterbox to a square input, infer, decode oriented boxes.
#[derive(Debug)]
pub struct YoloObbModel {
    inference: OrtInfer,
    normalizer: NormalizeImage,
    postprocess: ObbPostProcess,
}

impl YoloObbModel {
    pub fn new(inference: OrtInfer, config: ObbDecodeConfig) -> Self {
        Self {
            inference,
            normalizer: NormalizeImage::unit_range(),
            postprocess: ObbPostProcess::new(config),
        }
    }

    pub fn model_name(&self) -> &str {
        self.inference.model_name()
    }

    pub fn config(&self) -> &ObbDecodeConfig {
        self.postprocess.config()
    }

    /// Letterboxes `image` into a `[1, 3, S, S]` tensor scaled to `[0, 1]`.
    pub fn preprocess(
        &self,
        image: &RgbImage,
    ) -> Result<(Array4<f32>, LetterboxTransform), DetectorError> {
        let (w, h) = image.dimensions();
        let letterbox = LetterboxTransform::compute(w, h, self.config().input_size);
        let canvas = letterbox.apply(image);
        let tensor = self.normalizer.normalize_to(&canvas)?;
        Ok((tensor, letterbox))
    }

    /// Runs the forward pass and returns the first output as a 2D prediction table.
    pub fn infer(&self, tensor: &Array4<f32>) -> Result<Array2<f32>, DetectorError> {
        let outputs = self.inference.infer(tensor)?;
        let (_, output) = outputs.into_iter().next().ok_or_else(|| {
            DetectorError::InvalidInput {
                message: format!("model '{}' returned no outputs", self.model_name()),
            }
        })?;
        output.try_into_array2_f32()
    }

    /// Decodes predictions into image-space boxes labelled with their class.
    pub fn postprocess(
        &self,
        predictions: &Array2<f32>,
        letterbox: &LetterboxTransform,
        conf_threshold: f32,
        iou_threshold: f32,
    ) -> Vec<OrientedBox> {
        self.postprocess
            .apply(predictions, letterbox, conf_threshold, iou_threshold)
    }

    /// Runs preprocessing, inference and decoding for one image.
    ///
    /// Boxes come back in `image` coordinates.
    pub fn forward(
        &self,
        image: &RgbImage,
        conf_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<OrientedBox>, DetectorError> {
        let (tensor, letterbox) = self.preprocess(image)?;
        let predictions = self.infer(&tensor)?;
        let boxes = self.postprocess(&predictions, &letterbox, conf_threshold, iou_threshold);
        tracing::debug!(
            "{}: {} boxes from {} predictions",
            self.model_name(),
            boxes.len(),
            predictions.nrows().max(predictions.ncols())
        );
        Ok(boxes)
    }
}
