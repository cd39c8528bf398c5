//! # Image Preprocessing Module
//!
//! This module provides document binarization and denoising for scanned pages.
//! It includes grayscale conversion, integral-image window statistics, local
//! adaptive thresholding (Sauvola and Nick), global thresholding, and an
//! adaptive median filter with automatic window sizing.
//!
//! The module is organized into focused sub-modules:
//! - `grayscale`: Interleaved pixel buffers to luminance
//! - `integral`: Summed-area tables for O(1) window sums
//! - `statistics`: Local mean/stddev providers (integral and naive)
//! - `thresholding`: Sauvola, Nick and global binarization
//! - `filtering`: Adaptive median filter
//! - `window_estimation`: Noise and edge based median window sizing
//! - `cancellation`: Cooperative cancellation for long runs
//! - `types`: Shared types and error definitions

pub mod cancellation;
pub mod filtering;
pub mod grayscale;
pub mod integral;
pub mod statistics;
pub mod thresholding;
pub mod types;
pub mod window_estimation;

// Re-export commonly used types and functions for convenience
pub use cancellation::CancellationToken;
pub use types::{
    AdaptiveThresholdResult, BinaryMask, DenoisedImageResult, GrayscaleImage, MedianWindowParams,
    PreprocessingError, StatisticsSource, ThresholdMethod, ThresholdParams,
    ThresholdedImageResult, WindowStats,
};

// Re-export main functions from sub-modules
pub use filtering::{
    adaptive_median_filter, adaptive_median_filter_cancellable, apply_adaptive_median_filter,
    apply_adaptive_median_filter_cancellable,
};
pub use grayscale::{luminance, to_grayscale};
pub use integral::{build_integral_tables, build_integral_tables_cancellable, IntegralTable};
pub use statistics::{LocalStatistics, NaiveLocalStatistics};
pub use thresholding::{
    apply_adaptive_threshold, apply_adaptive_threshold_cancellable, apply_global_threshold,
    binarize, binarize_cancellable, binarize_global, binarize_global_sequential, nick_threshold,
    sauvola_threshold, ThresholdPolicy,
};
pub use window_estimation::{estimate_noise, estimate_window_params, select_window, NoiseEstimate};
