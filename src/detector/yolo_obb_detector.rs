use super::DetectorBackend;
use super::loader::{ModelSlot, ModelSpec};
use crate::core::config::Device;
use crate::core::errors::DetectorError;
use crate::domain::{DetectionParams, RawDetection};
use crate::models::YoloObbModel;
use crate::processors::ObbDecodeConfig;
use image::RgbImage;

/// Oriented speech-bubble detector.
///
/// `text_threshold` is the box confidence threshold and `iou_threshold` the
/// suppression threshold. It produces no probability map.
#[derive(Debug)]
pub struct YoloObbDetector {
    slot: ModelSlot<YoloObbModel>,
    decode: ObbDecodeConfig,
}

impl YoloObbDetector {
    /// Creates an unloaded detector. The session is opened on the first `load`.
    pub fn new(spec: ModelSpec, decode: ObbDecodeConfig) -> Self {
        Self {
            slot: ModelSlot::new(spec),
            decode,
        }
    }
}

impl DetectorBackend for YoloObbDetector {
    fn name(&self) -> &str {
        &self.slot.spec().name
    }

    fn load(&self, device: Device) -> Result<(), DetectorError> {
        let decode = self.decode.clone();
        self.slot
            .load_with(device, |inference| YoloObbModel::new(inference, decode))
    }

    fn unload(&self) {
        self.slot.unload()
    }

    fn is_loaded(&self) -> bool {
        self.slot.is_loaded()
    }

    fn prepare(&self) -> Result<(), DetectorError> {
        self.slot.spec().prepare().map(|_| ())
    }

    fn detect_raw(
        &self,
        image: &RgbImage,
        params: &DetectionParams,
    ) -> Result<RawDetection, DetectorError> {
        let model = self.slot.get()?;
        let boxes = model
            .forward(image, params.text_threshold, params.iou_threshold)
            .map_err(|e| {
                DetectorError::adapter_execution_error(
                    self.name(),
                    format!(
                        "failed to detect boxes (conf={}, iou={})",
                        params.text_threshold, params.iou_threshold
                    ),
                    e,
                )
            })?;
        Ok(RawDetection {
            boxes,
            raw_mask: None,
            debug_mask: None,
        })
    }
}
