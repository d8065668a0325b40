//! Text detection models.

pub mod db;
pub mod yolo_obb;

pub use db::{DbModel, DbPreprocessed};
pub use yolo_obb::YoloObbModel;
