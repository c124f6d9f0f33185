use crate::error::CaptchaError;
use image::DynamicImage;
use serde::Serialize;
use std::time::Instant;

use super::steps;

/// Darkness cutoff for the gf decorative-stroke eraser
const GF_DARKNESS_CUTOFF: u8 = 100;
/// Intensity band holding gf glyph strokes (exclusive)
const GF_BAND: (u8, u8) = (68, 90);
/// Median passes after the minimum filter in the gf chain
const GF_MEDIAN_PASSES: usize = 3;

/// A single conditioning operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    RemapDarkPixels { cutoff: u8 },
    Grayscale,
    Contrast { factor: f32 },
    Binarize { threshold: u8 },
    BandPass { low: u8, high: u8 },
    Denoise { passes: usize },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RemapDarkPixels { .. } => "remap_dark_pixels",
            Self::Grayscale => "grayscale",
            Self::Contrast { .. } => "contrast",
            Self::Binarize { .. } => "binarize",
            Self::BandPass { .. } => "band_pass",
            Self::Denoise { .. } => "denoise",
        }
    }

    fn apply(&self, image: &DynamicImage) -> Result<DynamicImage, CaptchaError> {
        match *self {
            Self::RemapDarkPixels { cutoff } => steps::remap::remap_dark_pixels(image, cutoff),
            Self::Grayscale => steps::grayscale::apply(image),
            Self::Contrast { factor } => steps::contrast::apply(image, factor),
            Self::Binarize { threshold } => steps::threshold::binarize(image, threshold),
            Self::BandPass { low, high } => steps::threshold::band_pass(image, low, high),
            Self::Denoise { passes } => steps::denoise::filter_chain(image, passes),
        }
    }
}

/// Timing information for a single conditioning step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of conditioning including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct ConditioningResult {
    /// Conditioned image (not serialized)
    #[serde(skip)]
    pub image: DynamicImage,
    pub total_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

/// Ordered chain of conditioning steps
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// grayscale -> contrast -> binarize, one per ensemble threshold
    pub fn voting(threshold: u8, contrast_factor: f32) -> Self {
        Self::new(vec![
            Step::Grayscale,
            Step::Contrast {
                factor: contrast_factor,
            },
            Step::Binarize { threshold },
        ])
    }

    /// Dedicated chain for gf captchas: erase dark decoration, isolate the
    /// stroke band, then clean up speckles
    pub fn gf() -> Self {
        Self::new(vec![
            Step::RemapDarkPixels {
                cutoff: GF_DARKNESS_CUTOFF,
            },
            Step::Grayscale,
            Step::BandPass {
                low: GF_BAND.0,
                high: GF_BAND.1,
            },
            Step::Denoise {
                passes: GF_MEDIAN_PASSES,
            },
        ])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run every step in order; the input image is only borrowed
    pub fn process(&self, image: &DynamicImage) -> Result<ConditioningResult, CaptchaError> {
        let start = Instant::now();
        let mut timings = Vec::with_capacity(self.steps.len());
        let mut img = image.clone();

        for step in &self.steps {
            let step_start = Instant::now();
            img = step.apply(&img)?;
            timings.push(StepTiming {
                name: step.name().to_string(),
                time_ms: step_start.elapsed().as_millis() as u64,
            });
        }

        let total_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            "Conditioned {}x{} image with {} step(s) in {}ms",
            img.width(),
            img.height(),
            timings.len(),
            total_time_ms
        );

        Ok(ConditioningResult {
            image: img,
            total_time_ms,
            steps: timings,
        })
    }
}
