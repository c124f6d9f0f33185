//! Leptess/Tesseract engine implementation
//!
//! Statically linked tesseract (tesseract-static crate), so no `tesseract`
//! binary is needed at runtime. Downloads tessdata on first use.

use crate::config::Config;
use crate::engine::{OcrEngine, DIGIT_WHITELIST, PAGE_SEG_MODE_SINGLE_WORD};
use crate::error::CaptchaError;
use image::DynamicImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tesseract_static::tesseract::Tesseract;

/// Tesseract OCR Engine
pub struct LeptessEngine {
    /// Path to tessdata directory
    tessdata_path: String,
    language: String,
}

impl LeptessEngine {
    pub fn new(config: &Config) -> Result<Self, CaptchaError> {
        let language = config.language.clone();
        let tessdata_path = match &config.tessdata_path {
            Some(path) => path.clone(),
            None => ensure_tessdata_available(&language)?,
        };

        // Fail early if the traineddata cannot be loaded
        Tesseract::new(Some(&tessdata_path), Some(&language)).map_err(|e| {
            CaptchaError::EngineUnavailable(format!("Failed to initialize Tesseract: {}", e))
        })?;

        tracing::info!(
            "Leptess engine initialized (tessdata: {}, language: {})",
            tessdata_path,
            language
        );

        Ok(Self {
            tessdata_path,
            language,
        })
    }
}

impl OcrEngine for LeptessEngine {
    fn name(&self) -> &'static str {
        "leptess"
    }

    fn description(&self) -> &'static str {
        "Statically linked Tesseract, single-word mode with digit whitelist"
    }

    fn recognize_text(&self, image: &DynamicImage) -> Result<String, CaptchaError> {
        let rgb_img = image.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        // BMP is always supported by leptonica
        let mut bmp_data = Vec::new();
        rgb_img
            .write_to(
                &mut std::io::Cursor::new(&mut bmp_data),
                image::ImageFormat::Bmp,
            )
            .map_err(|e| CaptchaError::Recognition(format!("Failed to convert to BMP: {}", e)))?;

        let tess = Tesseract::new(Some(&self.tessdata_path), Some(&self.language))
            .map_err(|e| CaptchaError::EngineUnavailable(format!("Failed to create Tesseract: {}", e)))?
            .set_variable("tessedit_pageseg_mode", PAGE_SEG_MODE_SINGLE_WORD)
            .and_then(|t| t.set_variable("tessedit_char_whitelist", DIGIT_WHITELIST))
            .map_err(|e| CaptchaError::Recognition(format!("Failed to configure Tesseract: {}", e)))?;

        let tess = tess.set_image_from_mem(&bmp_data).map_err(|e| {
            CaptchaError::Recognition(format!(
                "Failed to set image ({}x{}, {} bytes): {}",
                width,
                height,
                bmp_data.len(),
                e
            ))
        })?;

        let mut tess = tess
            .recognize()
            .map_err(|e| CaptchaError::Recognition(format!("Failed to recognize text: {}", e)))?;

        tess.get_text()
            .map_err(|e| CaptchaError::Recognition(format!("Failed to get text: {}", e)))
    }
}

/// Ensure tessdata is available, downloading if needed
fn ensure_tessdata_available(language: &str) -> Result<String, CaptchaError> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("captcha-solver")
        .join("tessdata");

    std::fs::create_dir_all(&cache_dir).map_err(|e| {
        CaptchaError::EngineUnavailable(format!("Failed to create tessdata directory: {}", e))
    })?;

    let traineddata_path = cache_dir.join(format!("{}.traineddata", language));

    if !traineddata_path.exists() {
        tracing::info!("Downloading tessdata for '{}'...", language);
        download_file(&tessdata_url(language), &traineddata_path)?;
        tracing::info!("Downloaded tessdata to {:?}", traineddata_path);
    } else {
        tracing::debug!("Using cached tessdata from {:?}", cache_dir);
    }

    cache_dir
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| CaptchaError::EngineUnavailable("Invalid tessdata path".to_string()))
}

fn tessdata_url(language: &str) -> String {
    format!(
        "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
        language
    )
}

fn download_file(url: &str, path: &Path) -> Result<(), CaptchaError> {
    let response = ureq::get(url).call().map_err(|e| {
        CaptchaError::EngineUnavailable(format!("Failed to download tessdata: {}", e))
    })?;

    let buffer = response.into_body().read_to_vec().map_err(|e| {
        CaptchaError::EngineUnavailable(format!("Failed to read tessdata response: {}", e))
    })?;

    let mut file = File::create(path).map_err(|e| {
        CaptchaError::EngineUnavailable(format!("Failed to create tessdata file: {}", e))
    })?;
    file.write_all(&buffer).map_err(|e| {
        CaptchaError::EngineUnavailable(format!("Failed to write tessdata file: {}", e))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tessdata_url_uses_fast_models() {
        assert_eq!(
            tessdata_url("eng"),
            "https://github.com/tesseract-ocr/tessdata_fast/raw/main/eng.traineddata"
        );
    }
}
