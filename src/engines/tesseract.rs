//! Tesseract command-line engine
//!
//! Pipes the image to the `tesseract` binary as PNG on stdin and reads the
//! recognized text from stdout, so no temporary files are written.

use crate::config::Config;
use crate::engine::{OcrEngine, DIGIT_WHITELIST, PAGE_SEG_MODE_SINGLE_WORD};
use crate::error::CaptchaError;
use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

pub struct TesseractCliEngine {
    binary: PathBuf,
    tessdata_path: Option<String>,
    language: String,
}

impl TesseractCliEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.engine_path.clone(),
            tessdata_path: config.tessdata_path.clone(),
            language: config.language.clone(),
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec!["stdin".to_string(), "stdout".to_string()];
        if let Some(tessdata) = &self.tessdata_path {
            args.push("--tessdata-dir".to_string());
            args.push(tessdata.clone());
        }
        args.extend([
            "-l".to_string(),
            self.language.clone(),
            "--psm".to_string(),
            PAGE_SEG_MODE_SINGLE_WORD.to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", DIGIT_WHITELIST),
        ]);
        args
    }

    fn unavailable(&self, e: std::io::Error) -> CaptchaError {
        CaptchaError::EngineUnavailable(format!(
            "cannot run {:?} ({}); install tesseract: https://github.com/tesseract-ocr/tesseract/wiki",
            self.binary, e
        ))
    }
}

impl OcrEngine for TesseractCliEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn description(&self) -> &'static str {
        "Tesseract command-line OCR, single-word mode with digit whitelist"
    }

    fn recognize_text(&self, image: &DynamicImage) -> Result<String, CaptchaError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| CaptchaError::Recognition(format!("Failed to encode PNG: {}", e)))?;

        let mut child = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.unavailable(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png).map_err(|e| {
                CaptchaError::Recognition(format!("Failed to send image to tesseract: {}", e))
            })?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| CaptchaError::Recognition(format!("tesseract did not finish: {}", e)))?;

        if !output.status.success() {
            return Err(CaptchaError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
