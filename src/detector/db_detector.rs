use super::DetectorBackend;
use super::loader::{ModelSlot, ModelSpec};
use crate::core::config::Device;
use crate::core::errors::DetectorError;
use crate::domain::{DetectionParams, RawDetection};
use crate::models::DbModel;
use crate::processors::DbPostProcess;
use image::RgbImage;

/// Default detector backed by a DB heat-map model.
#[derive(Debug)]
pub struct DbDetector {
    slot: ModelSlot<DbModel>,
    postprocess: DbPostProcess,
}

impl DbDetector {
    /// Creates an unloaded detector. The session is opened on the first `load`.
    pub fn new(spec: ModelSpec, postprocess: DbPostProcess) -> Self {
        Self {
            slot: ModelSlot::new(spec),
            postprocess,
        }
    }
}

impl DetectorBackend for DbDetector {
    fn name(&self) -> &str {
        &self.slot.spec().name
    }

    fn load(&self, device: Device) -> Result<(), DetectorError> {
        let postprocess = self.postprocess.clone();
        self.slot
            .load_with(device, |inference| DbModel::new(inference, postprocess))
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
        model.forward(image, params).map_err(|e| {
            DetectorError::adapter_execution_error(
                self.name(),
                format!(
                    "failed to detect text (text_threshold={}, box_threshold={}, unclip_ratio={})",
                    params.text_threshold, params.box_threshold, params.unclip_ratio
                ),
                e,
            )
        })
    }
}
