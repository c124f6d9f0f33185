//! Multi-threshold OCR voting
//!
//! Single-threshold binarization is brittle when glyph contrast varies, so the
//! image is read once per threshold and the most frequent 4-digit reading wins.

use crate::config::Config;
use crate::engine::OcrEngine;
use crate::error::CaptchaError;
use crate::preprocessing::{load_image, Pipeline};
use image::DynamicImage;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Number of digits in a valid captcha answer
pub const CAPTCHA_LENGTH: usize = 4;

/// One reading, tagged with the threshold that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionCandidate {
    pub digits: String,
    pub threshold: u8,
}

/// Occurrence counts in first-seen order
#[derive(Debug, Default)]
pub struct VoteTally {
    entries: Vec<(String, usize)>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a reading; anything that is not exactly 4 digits is ignored.
    /// Returns whether the reading was counted.
    pub fn record(&mut self, digits: &str) -> bool {
        if !is_valid_answer(digits) {
            return false;
        }
        match self.entries.iter_mut().find(|(value, _)| value == digits) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((digits.to_string(), 1)),
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, digits: &str) -> usize {
        self.entries
            .iter()
            .find(|(value, _)| value == digits)
            .map_or(0, |(_, count)| *count)
    }

    /// Plurality winner; ties go to the reading seen first
    pub fn winner(&self) -> Option<&str> {
        let mut best: Option<&(String, usize)> = None;
        for entry in &self.entries {
            if best.map_or(true, |(_, count)| entry.1 > *count) {
                best = Some(entry);
            }
        }
        best.map(|(value, _)| value.as_str())
    }
}

/// Exactly [`CAPTCHA_LENGTH`] ASCII digits
pub fn is_valid_answer(value: &str) -> bool {
    value.len() == CAPTCHA_LENGTH && value.bytes().all(|b| b.is_ascii_digit())
}

pub struct VotingEnsemble {
    engine: Arc<dyn OcrEngine>,
    thresholds: Vec<u8>,
    contrast_factor: f32,
    parallel: bool,
}

impl VotingEnsemble {
    pub fn new(engine: Arc<dyn OcrEngine>, config: &Config) -> Self {
        Self {
            engine,
            thresholds: config.thresholds.clone(),
            contrast_factor: config.contrast_factor,
            parallel: config.parallel_voting,
        }
    }

    /// Load the image once and vote across all thresholds
    pub fn recognize_by_voting(&self, image_path: &Path) -> Result<String, CaptchaError> {
        self.vote(&load_image(image_path)?)
    }

    pub fn vote(&self, image: &DynamicImage) -> Result<String, CaptchaError> {
        if self.thresholds.is_empty() {
            return Err(CaptchaError::Config(
                "voting ensemble needs at least one threshold".to_string(),
            ));
        }

        let candidates = self.collect_candidates(image)?;

        let mut tally = VoteTally::new();
        for candidate in &candidates {
            tally.record(&candidate.digits);
        }

        match tally.winner() {
            Some(winner) => {
                tracing::info!(
                    "Voting picked {} ({} of {} threshold(s) agreed)",
                    winner,
                    tally.count(winner),
                    self.thresholds.len()
                );
                Ok(winner.to_string())
            }
            None => Err(CaptchaError::NoCandidateRecognized {
                attempts: self.thresholds.len(),
            }),
        }
    }

    /// Valid readings in threshold order, regardless of execution order.
    /// Stops at the first `EngineUnavailable` when running sequentially.
    fn collect_candidates(
        &self,
        image: &DynamicImage,
    ) -> Result<Vec<RecognitionCandidate>, CaptchaError> {
        if self.parallel {
            self.thresholds
                .par_iter()
                .map(|&threshold| self.read_at(image, threshold))
                .filter_map(Result::transpose)
                .collect()
        } else {
            self.thresholds
                .iter()
                .map(|&threshold| self.read_at(image, threshold))
                .filter_map(Result::transpose)
                .collect()
        }
    }

    /// `Ok(None)` for readings discarded as noise
    fn read_at(
        &self,
        image: &DynamicImage,
        threshold: u8,
    ) -> Result<Option<RecognitionCandidate>, CaptchaError> {
        let conditioned = Pipeline::voting(threshold, self.contrast_factor).process(image)?;

        let digits = match self.engine.recognize_digits(&conditioned.image) {
            Ok(digits) => digits,
            Err(e @ CaptchaError::EngineUnavailable(_)) => return Err(e),
            Err(e) => {
                tracing::warn!("Threshold {} skipped: {}", threshold, e);
                return Ok(None);
            }
        };

        if digits.len() != CAPTCHA_LENGTH {
            tracing::debug!("Threshold {} read {:?}, discarded", threshold, digits);
            return Ok(None);
        }

        tracing::debug!("Threshold {} read {}", threshold, digits);
        Ok(Some(RecognitionCandidate { digits, threshold }))
    }
}
