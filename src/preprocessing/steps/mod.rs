//! Individual conditioning steps

pub mod contrast;
pub mod denoise;
pub mod grayscale;
pub mod remap;
pub mod threshold;
