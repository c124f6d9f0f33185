use crate::broker::UnknownBrokerPolicy;
use crate::error::{CaptchaError, FailureKind};
use std::path::PathBuf;
use std::time::Duration;

/// Default endpoint of the hosted recognition service
pub const DEFAULT_REMOTE_ENDPOINT: &str = "http://yh.ez.shidenggui.com:5000/yh_client";

/// Binarization thresholds tried by the voting ensemble, in vote order
pub const DEFAULT_THRESHOLDS: [u8; 3] = [180, 200, 220];

pub const DEFAULT_CONTRAST_FACTOR: f32 = 1.5;

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EngineKind {
    /// `tesseract` command-line binary
    Tesseract,
    /// Statically linked tesseract library
    Leptess,
}

/// Recognition configuration, passed explicitly to every component
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub engine: EngineKind,
    /// Path (or bare name resolved through PATH) of the tesseract binary
    pub engine_path: PathBuf,
    pub tessdata_path: Option<String>,
    pub language: String,
    pub remote_endpoint: String,
    pub remote_timeout: Duration,
    pub thresholds: Vec<u8>,
    pub contrast_factor: f32,
    pub parallel_voting: bool,
    pub manual_enabled: bool,
    pub manual_timeout: Option<Duration>,
    /// Image viewer command; platform opener when unset
    pub viewer: Option<String>,
    pub unknown_broker: UnknownBrokerPolicy,
    /// Remote failures that move the default chain on to the voting ensemble
    pub remote_fallback_on: Vec<FailureKind>,
    /// Ensemble failures that move the default chain on to manual input
    pub ensemble_fallback_on: Vec<FailureKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_file_size: 1024 * 1024,
            engine: EngineKind::Tesseract,
            engine_path: PathBuf::from("tesseract"),
            tessdata_path: None,
            language: "eng".to_string(),
            remote_endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            remote_timeout: Duration::from_secs(10),
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            contrast_factor: DEFAULT_CONTRAST_FACTOR,
            parallel_voting: false,
            manual_enabled: true,
            manual_timeout: None,
            viewer: None,
            unknown_broker: UnknownBrokerPolicy::Reject,
            remote_fallback_on: vec![
                FailureKind::Network,
                FailureKind::RemoteService,
                FailureKind::MalformedResponse,
                FailureKind::WrongLength,
            ],
            ensemble_fallback_on: vec![FailureKind::NoCandidate],
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), CaptchaError> {
        if self.thresholds.is_empty() {
            return Err(CaptchaError::Config(
                "at least one binarization threshold is required".to_string(),
            ));
        }
        if !(self.contrast_factor.is_finite() && self.contrast_factor > 0.0) {
            return Err(CaptchaError::Config(format!(
                "contrast factor must be a positive number, got {}",
                self.contrast_factor
            )));
        }
        if self.remote_endpoint.trim().is_empty() {
            return Err(CaptchaError::Config(
                "remote endpoint must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
