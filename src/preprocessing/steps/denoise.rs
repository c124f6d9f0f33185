use crate::error::CaptchaError;
use image::DynamicImage;
use imageproc::filter::median_filter;
use imageproc::morphology::{grayscale_erode, Mask};

/// Remove speckle noise while keeping strokes connected
///
/// One 3x3 minimum filter followed by `passes` 3x3 median filters.
pub fn filter_chain(image: &DynamicImage, passes: usize) -> Result<DynamicImage, CaptchaError> {
    let mut gray = grayscale_erode(&image.to_luma8(), &Mask::square(1));
    for _ in 0..passes {
        gray = median_filter(&gray, 1, 1);
    }
    Ok(DynamicImage::ImageLuma8(gray))
}
