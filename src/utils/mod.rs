//! Logging setup and image loading helpers.

use crate::core::errors::DetectorError;
use image::RgbImage;
use std::path::Path;

/// Initializes the global tracing subscriber.
///
/// Filtering follows `RUST_LOG`. Call at most once per process.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Opens an image file and converts it to 8-bit RGB.
pub fn load_image(path: &Path) -> Result<RgbImage, DetectorError> {
    let img = image::open(path)?;
    Ok(img.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_load_image_converts_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        image::GrayImage::from_pixel(6, 4, image::Luma([200])).save(&path).unwrap();

        let img = load_image(&path).unwrap();
        assert_eq!(img.dimensions(), (6, 4));
        assert_eq!(img.get_pixel(0, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_missing_file_is_image_load_error() {
        let err = load_image(Path::new("/nonexistent/page.png")).unwrap_err();
        assert!(matches!(err, DetectorError::ImageLoad(_)));
    }
}
