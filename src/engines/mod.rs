//! OCR engine implementations
//!
//! Engines are conditionally compiled based on feature flags; the one named
//! in the configuration is built by [`build_engine`].

#[cfg(feature = "engine-tesseract")]
pub mod tesseract;

#[cfg(feature = "engine-leptess")]
pub mod leptess;

use crate::config::{Config, EngineKind};
use crate::engine::OcrEngine;
use crate::error::CaptchaError;
use std::sync::Arc;

/// Build the engine selected in the configuration
pub fn build_engine(config: &Config) -> Result<Arc<dyn OcrEngine>, CaptchaError> {
    match config.engine {
        EngineKind::Tesseract => tesseract_engine(config),
        EngineKind::Leptess => leptess_engine(config),
    }
}

#[cfg(feature = "engine-tesseract")]
fn tesseract_engine(config: &Config) -> Result<Arc<dyn OcrEngine>, CaptchaError> {
    tracing::debug!("Using tesseract binary {:?}", config.engine_path);
    Ok(Arc::new(tesseract::TesseractCliEngine::new(config)))
}

#[cfg(not(feature = "engine-tesseract"))]
fn tesseract_engine(_config: &Config) -> Result<Arc<dyn OcrEngine>, CaptchaError> {
    Err(CaptchaError::EngineUnavailable(
        "tesseract engine not compiled in. Build with --features engine-tesseract".to_string(),
    ))
}

#[cfg(feature = "engine-leptess")]
fn leptess_engine(config: &Config) -> Result<Arc<dyn OcrEngine>, CaptchaError> {
    tracing::info!("Initializing leptess engine...");
    Ok(Arc::new(leptess::LeptessEngine::new(config)?))
}

#[cfg(not(feature = "engine-leptess"))]
fn leptess_engine(_config: &Config) -> Result<Arc<dyn OcrEngine>, CaptchaError> {
    Err(CaptchaError::EngineUnavailable(
        "leptess engine not compiled in. Build with --features engine-leptess".to_string(),
    ))
}
