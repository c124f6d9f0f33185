use crate::error::CaptchaError;
use image::{DynamicImage, Rgb, RgbImage};

/// Erase pixels darker than `cutoff` on every channel by painting them white
pub fn remap_dark_pixels(image: &DynamicImage, cutoff: u8) -> Result<DynamicImage, CaptchaError> {
    remap_dark_pixels_with(image, cutoff, u8::MAX as u32)
}

/// Same as [`remap_dark_pixels`] with an explicit sentinel.
///
/// Sentinels above the channel range are clamped to 255.
pub fn remap_dark_pixels_with(
    image: &DynamicImage,
    cutoff: u8,
    sentinel: u32,
) -> Result<DynamicImage, CaptchaError> {
    let fill = sentinel.min(u8::MAX as u32) as u8;
    let source = image.to_rgb8();

    let remapped = RgbImage::from_fn(source.width(), source.height(), |x, y| {
        let pixel = *source.get_pixel(x, y);
        if pixel.0.iter().all(|&channel| channel < cutoff) {
            Rgb([fill, fill, fill])
        } else {
            pixel
        }
    });

    Ok(DynamicImage::ImageRgb8(remapped))
}
