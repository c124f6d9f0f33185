use crate::error::CaptchaError;
use image::DynamicImage;

/// Page-segmentation mode 8: treat the image as a single word
pub const PAGE_SEG_MODE_SINGLE_WORD: &str = "8";

/// Characters the engine is allowed to emit
pub const DIGIT_WHITELIST: &str = "0123456789";

/// Trait that all OCR engines must implement
///
/// Engines are expected to honour the single-word page segmentation and the
/// digit whitelist; output is still filtered by [`OcrEngine::recognize_digits`].
pub trait OcrEngine: Send + Sync {
    /// Returns the engine identifier (e.g., "tesseract", "leptess")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Raw engine output for a single image, whitespace included
    fn recognize_text(&self, image: &DynamicImage) -> Result<String, CaptchaError>;

    /// Engine output reduced to its decimal digits, in original order
    fn recognize_digits(&self, image: &DynamicImage) -> Result<String, CaptchaError> {
        let raw = self.recognize_text(image)?;
        let digits = digits_only(&raw);
        tracing::trace!("{} read {:?} -> {:?}", self.name(), raw, digits);
        Ok(digits)
    }
}

/// Keep only ASCII decimal digits
pub fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEngine(&'static str);

    impl OcrEngine for FixedEngine {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn description(&self) -> &'static str {
            "returns a fixed string"
        }

        fn recognize_text(&self, _image: &DynamicImage) -> Result<String, CaptchaError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_digits_only_keeps_order() {
        assert_eq!(digits_only("a1b2c3d4"), "1234");
        assert_eq!(digits_only(" 9-8.7_6\n"), "9876");
        assert_eq!(digits_only("\u{c}"), "");
    }

    #[test]
    fn test_digits_only_drops_non_ascii_digits() {
        // Full-width and Arabic-Indic digits are not part of the whitelist
        assert_eq!(digits_only("１2٣4"), "24");
    }

    #[test]
    fn test_recognize_digits_filters_engine_noise() {
        let image = DynamicImage::new_luma8(4, 4);
        for raw in ["12 34\n", "1|2:3'4", "x1y2z3w4", "\t1234\u{c}"] {
            assert_eq!(FixedEngine(raw).recognize_digits(&image).unwrap(), "1234");
        }
    }
}
