use crate::error::CaptchaError;
use image::{DynamicImage, GrayImage, Luma};

/// Scale each pixel's deviation from the mean luminance by `factor`
///
/// `p' = mean + factor * (p - mean)`, clamped to 0-255. A factor above 1
/// increases contrast, 1 is the identity.
pub fn apply(image: &DynamicImage, factor: f32) -> Result<DynamicImage, CaptchaError> {
    if !(factor.is_finite() && factor > 0.0) {
        return Err(CaptchaError::Preprocessing(format!(
            "contrast factor must be positive, got {}",
            factor
        )));
    }

    let gray = image.to_luma8();
    let mean = mean_luminance(&gray);

    let enhanced = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let pixel = gray.get_pixel(x, y).0[0] as f32;
        let value = mean + factor * (pixel - mean);
        Luma([value.round().clamp(0.0, 255.0) as u8])
    });

    Ok(DynamicImage::ImageLuma8(enhanced))
}

/// Mean luminance rounded to the nearest integer level
fn mean_luminance(img: &GrayImage) -> f32 {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = img.pixels().map(|p| p.0[0] as u64).sum();
    (sum as f64 / count as f64).round() as f32
}
