//! # Image Filtering Module
//!
//! This module provides the adaptive median filter used to remove impulse
//! noise before thresholding while keeping text edges intact.

use rayon::prelude::*;
use tracing;

use super::cancellation::CancellationToken;
use super::types::{DenoisedImageResult, GrayscaleImage, MedianWindowParams, PreprocessingError};
use super::window_estimation::estimate_window_params;

/// Minimum, median and maximum of a window's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderStats {
    min: u8,
    median: u8,
    max: u8,
}

/// Applies the adaptive median filter to `gray`.
///
/// Each pixel starts with a `min_size` window. When the window's median lies
/// strictly between its minimum and maximum, the pixel keeps its own value if
/// it also lies strictly between them and is replaced by the median otherwise.
/// When the median coincides with an extreme the window grows by 2, adding only
/// the newly exposed ring, up to `max_size`; an exhausted search outputs the
/// median of the largest window.
///
/// # Arguments
///
/// * `gray` - Input image
/// * `params` - Window bounds, see [`estimate_window_params`]
///
/// # Errors
///
/// Returns `PreprocessingError::InvalidWindowBounds` for even or inverted
/// bounds.
///
/// # Examples
///
/// ```
/// use adaptive_binarization::preprocessing::{
///     adaptive_median_filter, GrayscaleImage, MedianWindowParams,
/// };
///
/// let mut data = vec![50u8; 49];
/// data[24] = 255;
/// let noisy = GrayscaleImage::new(7, 7, data).unwrap();
/// let params = MedianWindowParams::new(3, 7).unwrap();
/// let clean = adaptive_median_filter(&noisy, params).unwrap();
/// assert!(clean.as_raw().iter().all(|&v| v == 50));
/// ```
pub fn adaptive_median_filter(
    gray: &GrayscaleImage,
    params: MedianWindowParams,
) -> Result<GrayscaleImage, PreprocessingError> {
    adaptive_median_filter_cancellable(gray, params, &CancellationToken::new())
}

/// Same as [`adaptive_median_filter`], polling `token` between rows.
pub fn adaptive_median_filter_cancellable(
    gray: &GrayscaleImage,
    params: MedianWindowParams,
    token: &CancellationToken,
) -> Result<GrayscaleImage, PreprocessingError> {
    params.validate()?;

    let width = gray.width() as usize;
    let capacity = (params.max_size as usize).pow(2).min(gray.len());
    let mut out = vec![0u8; gray.len()];

    // Rows vary in cost with the number of growth steps; rayon's work stealing
    // rebalances them. Each task owns its sample buffer.
    out.par_chunks_mut(width).enumerate().try_for_each_init(
        || Vec::with_capacity(capacity),
        |samples: &mut Vec<u8>, (y, row)| {
            token.check()?;
            for (x, dst) in row.iter_mut().enumerate() {
                *dst = filter_pixel(gray, x, y, params, samples);
            }
            Ok::<(), PreprocessingError>(())
        },
    )?;

    GrayscaleImage::new(gray.width(), gray.height(), out)
}

/// Runs the adaptive median filter, estimating the window bounds when none
/// are supplied, and reports timing metadata.
pub fn apply_adaptive_median_filter(
    gray: &GrayscaleImage,
    params: Option<MedianWindowParams>,
) -> Result<DenoisedImageResult, PreprocessingError> {
    apply_adaptive_median_filter_cancellable(gray, params, &CancellationToken::new())
}

/// Same as [`apply_adaptive_median_filter`], polling `token` between rows.
pub fn apply_adaptive_median_filter_cancellable(
    gray: &GrayscaleImage,
    params: Option<MedianWindowParams>,
    token: &CancellationToken,
) -> Result<DenoisedImageResult, PreprocessingError> {
    let start_time = std::time::Instant::now();

    let estimated = params.is_none();
    let window = match params {
        Some(window) => window,
        None => estimate_window_params(gray),
    };

    let image = adaptive_median_filter_cancellable(gray, window, token)?;

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "image_preprocessing",
        "Adaptive median filter completed in {:.2}ms: window={}..{}, estimated={}, dimensions={}x{}",
        processing_time.as_secs_f64() * 1000.0,
        window.min_size,
        window.max_size,
        estimated,
        gray.width(),
        gray.height()
    );
    crate::observability::record_preprocessing_metrics("median", processing_time, gray.len());

    Ok(DenoisedImageResult {
        image,
        window,
        estimated,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

fn filter_pixel(
    gray: &GrayscaleImage,
    x: usize,
    y: usize,
    params: MedianWindowParams,
    samples: &mut Vec<u8>,
) -> u8 {
    let pixel = gray.pixel(x, y);
    let max_half = (params.max_size / 2) as usize;
    let mut half = (params.min_size / 2) as usize;

    samples.clear();
    collect_window(gray, x, y, half, samples);

    loop {
        let stats = order_stats(samples);
        if stats.min < stats.median && stats.median < stats.max {
            return if stats.min < pixel && pixel < stats.max {
                pixel
            } else {
                stats.median
            };
        }
        if half >= max_half || covers_image(gray, x, y, half) {
            return stats.median;
        }
        half += 1;
        push_ring(gray, x, y, half, samples);
    }
}

/// Whether the window of radius `half` already spans the whole image, so
/// growing it adds no samples.
fn covers_image(gray: &GrayscaleImage, x: usize, y: usize, half: usize) -> bool {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    half >= x && x + half >= width - 1 && half >= y && y + half >= height - 1
}

/// Appends the in-bounds samples of the square window of radius `half`.
fn collect_window(gray: &GrayscaleImage, x: usize, y: usize, half: usize, samples: &mut Vec<u8>) {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    let x1 = x.saturating_sub(half);
    let x2 = (x + half).min(width - 1);
    let y1 = y.saturating_sub(half);
    let y2 = (y + half).min(height - 1);

    for yy in y1..=y2 {
        samples.extend_from_slice(&gray.row(yy)[x1..=x2]);
    }
}

/// Appends the in-bounds samples at Chebyshev distance exactly `half` from
/// `(x, y)`, i.e. the border ring gained when growing from `half - 1`.
fn push_ring(gray: &GrayscaleImage, x: usize, y: usize, half: usize, samples: &mut Vec<u8>) {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    let x1 = x.saturating_sub(half);
    let x2 = (x + half).min(width - 1);

    // Top and bottom rows, corners included
    if y >= half {
        samples.extend_from_slice(&gray.row(y - half)[x1..=x2]);
    }
    if y + half < height {
        samples.extend_from_slice(&gray.row(y + half)[x1..=x2]);
    }

    // Left and right columns between them
    let inner_y1 = (y + 1).saturating_sub(half);
    let inner_y2 = (y + half - 1).min(height - 1);
    for yy in inner_y1..=inner_y2 {
        let row = gray.row(yy);
        if x >= half {
            samples.push(row[x - half]);
        }
        if x + half < width {
            samples.push(row[x + half]);
        }
    }
}

/// Min, max and median by selection. Reorders `samples`, which is fine since
/// later rings only append.
fn order_stats(samples: &mut [u8]) -> OrderStats {
    let (min, max) = samples
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let mid = samples.len() / 2;
    let (_, median, _) = samples.select_nth_unstable(mid);
    OrderStats {
        min,
        median: *median,
        max,
    }
}
