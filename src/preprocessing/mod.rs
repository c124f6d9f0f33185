//! Image conditioning for captcha OCR
//!
//! Every step returns a new image; callers never observe their input change.

pub mod pipeline;
pub mod steps;

pub use pipeline::{ConditioningResult, Pipeline, StepTiming};

use crate::error::CaptchaError;
use image::{DynamicImage, ImageReader};
use std::path::Path;

/// Decode an image file, sniffing the format from its contents so paths
/// without an extension load too
pub fn load_image(image_path: &Path) -> Result<DynamicImage, CaptchaError> {
    let load_error = |e: &dyn std::fmt::Display| {
        CaptchaError::ImageLoad(format!("{}: {}", image_path.display(), e))
    };
    ImageReader::open(image_path)
        .and_then(ImageReader::with_guessed_format)
        .map_err(|e| load_error(&e))?
        .decode()
        .map_err(|e| load_error(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma};

    #[test]
    fn test_load_image_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captcha");
        GrayImage::from_fn(12, 6, |x, _| Luma([(x * 20) as u8]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let image = load_image(&path).unwrap();
        assert_eq!((image.width(), image.height()), (12, 6));
    }

    #[test]
    fn test_load_image_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captcha.png");
        std::fs::write(&path, b"not an image").unwrap();

        assert!(matches!(load_image(&path), Err(CaptchaError::ImageLoad(_))));
        assert!(matches!(
            load_image(&dir.path().join("missing")),
            Err(CaptchaError::ImageLoad(_))
        ));
    }
}
