//! # Adaptive Binarization
//!
//! Document image binarization and denoising: Sauvola and Nick local
//! thresholding driven by integral-image statistics, a fixed global
//! threshold, and an adaptive median filter that sizes its window from the
//! image's noise level and edge density.

pub mod cli;
pub mod config;
pub mod errors;
pub mod image_io;
pub mod observability;
pub mod observability_config;
pub mod pipeline;
pub mod preprocessing;

// Re-export types for easier access
pub use errors::{AppError, AppResult};
pub use preprocessing::{BinaryMask, GrayscaleImage, PreprocessingError, ThresholdParams};
