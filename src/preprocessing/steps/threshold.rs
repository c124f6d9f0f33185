use crate::error::CaptchaError;
use image::{DynamicImage, GrayImage, Luma};

pub const DARK: u8 = 0;
pub const LIGHT: u8 = 255;

/// Fixed-level binarization
///
/// Pixels with intensity `>= threshold` become light, everything else dark.
pub fn binarize(image: &DynamicImage, threshold: u8) -> Result<DynamicImage, CaptchaError> {
    let gray = image.to_luma8();
    let binarized = map_pixels(&gray, |p| if p < threshold { DARK } else { LIGHT });
    Ok(DynamicImage::ImageLuma8(binarized))
}

/// Keep only a narrow intensity band as glyph strokes
///
/// Pixels strictly between `low` and `high` become dark, everything else light.
pub fn band_pass(image: &DynamicImage, low: u8, high: u8) -> Result<DynamicImage, CaptchaError> {
    if low >= high {
        return Err(CaptchaError::Preprocessing(format!(
            "empty intensity band ({}, {})",
            low, high
        )));
    }

    let gray = image.to_luma8();
    let banded = map_pixels(&gray, |p| if low < p && p < high { DARK } else { LIGHT });
    Ok(DynamicImage::ImageLuma8(banded))
}

fn map_pixels(gray: &GrayImage, f: impl Fn(u8) -> u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([f(gray.get_pixel(x, y).0[0])])
    })
}
