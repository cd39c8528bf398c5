//! # Image Thresholding Module
//!
//! This module provides binary thresholding for OCR preprocessing: the local
//! adaptive methods (Sauvola, Nick) driven by windowed statistics, and a fixed
//! global threshold.

use rayon::prelude::*;
use tracing;

use super::cancellation::CancellationToken;
use super::integral::build_integral_tables_cancellable;
use super::statistics::{LocalStatistics, NaiveLocalStatistics};
use super::types::{
    AdaptiveThresholdResult, BinaryMask, GrayscaleImage, PreprocessingError, StatisticsSource,
    ThresholdParams, ThresholdMethod, ThresholdedImageResult,
};

/// Threshold rule resolved from [`ThresholdParams`].
///
/// Resolved once per binarization call; the hot loop receives a
/// monomorphized closure rather than matching per pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdPolicy {
    Sauvola { k: f64, r: f64 },
    Nick { k: f64 },
}

impl ThresholdPolicy {
    pub fn from_params(params: &ThresholdParams) -> Self {
        match params.method {
            ThresholdMethod::Sauvola => ThresholdPolicy::Sauvola {
                k: params.k,
                r: params.r,
            },
            ThresholdMethod::Nick => ThresholdPolicy::Nick { k: params.k },
        }
    }

    /// Threshold for a window with the given mean and standard deviation.
    pub fn threshold(&self, mean: f64, stddev: f64) -> f64 {
        match *self {
            ThresholdPolicy::Sauvola { k, r } => sauvola_threshold(mean, stddev, k, r),
            ThresholdPolicy::Nick { k } => nick_threshold(mean, stddev, k),
        }
    }
}

/// Sauvola: `mean * (1 + k * (stddev / r - 1))`.
///
/// `r` is the expected dynamic range of the standard deviation, 128 for 8-bit
/// images. On a flat window the threshold is `mean * (1 - k)`.
#[inline]
pub fn sauvola_threshold(mean: f64, stddev: f64, k: f64, r: f64) -> f64 {
    mean * (1.0 + k * (stddev / r - 1.0))
}

/// Nick: `mean + k * stddev`.
///
/// `k` carries the sign. Negative values (-0.2 to -0.1) lower the threshold
/// below the local mean, which keeps faint background as white.
#[inline]
pub fn nick_threshold(mean: f64, stddev: f64, k: f64) -> f64 {
    mean + k * stddev
}

/// Binarizes `gray` with a local adaptive threshold.
///
/// Every pixel is compared with the threshold computed from the statistics of
/// the `window_size` window centered on it: strictly brighter pixels become 255,
/// the rest 0. The result does not depend on thread count or scheduling.
///
/// # Arguments
///
/// * `gray` - Input image
/// * `params` - Method, window size and coefficients
/// * `stats` - Statistics provider built for `gray`
///
/// # Errors
///
/// Returns a `PreprocessingError` if the parameters are invalid or `stats`
/// was built for an image of different dimensions.
///
/// # Examples
///
/// ```
/// use adaptive_binarization::preprocessing::{
///     binarize, build_integral_tables, GrayscaleImage, ThresholdParams,
/// };
///
/// let gray = GrayscaleImage::filled(5, 5, 100).unwrap();
/// let table = build_integral_tables(&gray);
/// let mask = binarize(&gray, &ThresholdParams::sauvola(3), &table).unwrap();
/// assert!(mask.as_raw().iter().all(|&v| v == 255));
/// ```
pub fn binarize<S>(
    gray: &GrayscaleImage,
    params: &ThresholdParams,
    stats: &S,
) -> Result<BinaryMask, PreprocessingError>
where
    S: LocalStatistics + ?Sized,
{
    binarize_cancellable(gray, params, stats, &CancellationToken::new())
}

/// Same as [`binarize`], polling `token` between rows.
pub fn binarize_cancellable<S>(
    gray: &GrayscaleImage,
    params: &ThresholdParams,
    stats: &S,
    token: &CancellationToken,
) -> Result<BinaryMask, PreprocessingError>
where
    S: LocalStatistics + ?Sized,
{
    params.validate()?;

    let dims = (gray.width() as usize, gray.height() as usize);
    if stats.dimensions() != dims {
        return Err(PreprocessingError::ProcessingFailed {
            message: format!(
                "statistics built for {}x{} but image is {}x{}",
                stats.dimensions().0,
                stats.dimensions().1,
                dims.0,
                dims.1
            ),
        });
    }

    let half_window = params.half_window();
    match ThresholdPolicy::from_params(params) {
        ThresholdPolicy::Sauvola { k, r } => {
            binarize_rows(gray, stats, half_window, token, move |mean, stddev| {
                sauvola_threshold(mean, stddev, k, r)
            })
        }
        ThresholdPolicy::Nick { k } => {
            binarize_rows(gray, stats, half_window, token, move |mean, stddev| {
                nick_threshold(mean, stddev, k)
            })
        }
    }
}

fn binarize_rows<S, F>(
    gray: &GrayscaleImage,
    stats: &S,
    half_window: usize,
    token: &CancellationToken,
    threshold: F,
) -> Result<BinaryMask, PreprocessingError>
where
    S: LocalStatistics + ?Sized,
    F: Fn(f64, f64) -> f64 + Sync,
{
    let width = gray.width() as usize;
    let mut out = vec![BinaryMask::BLACK; gray.len()];

    out.par_chunks_mut(width)
        .enumerate()
        .try_for_each(|(y, row)| {
            token.check()?;
            for (x, (dst, &value)) in row.iter_mut().zip(gray.row(y)).enumerate() {
                let window = stats.local_mean_std(x, y, half_window);
                let t = threshold(window.mean, window.stddev);
                *dst = if value as f64 > t {
                    BinaryMask::WHITE
                } else {
                    BinaryMask::BLACK
                };
            }
            Ok::<(), PreprocessingError>(())
        })?;

    Ok(BinaryMask::from_parts(gray.width(), gray.height(), out))
}

/// Binarizes `gray` against one global threshold, in parallel.
///
/// Pixels strictly above `threshold` become 255. Re-thresholding a 0/255 mask
/// at any value in `0..255` reproduces it.
pub fn binarize_global(gray: &GrayscaleImage, threshold: u8) -> BinaryMask {
    let out = gray
        .as_raw()
        .par_iter()
        .map(|&v| global_decision(v, threshold))
        .collect();
    BinaryMask::from_parts(gray.width(), gray.height(), out)
}

/// Single-threaded variant of [`binarize_global`].
pub fn binarize_global_sequential(gray: &GrayscaleImage, threshold: u8) -> BinaryMask {
    let out = gray
        .as_raw()
        .iter()
        .map(|&v| global_decision(v, threshold))
        .collect();
    BinaryMask::from_parts(gray.width(), gray.height(), out)
}

#[inline]
fn global_decision(value: u8, threshold: u8) -> u8 {
    if value > threshold {
        BinaryMask::WHITE
    } else {
        BinaryMask::BLACK
    }
}

/// Runs Sauvola or Nick thresholding end to end and reports timing metadata.
///
/// Builds the statistics provider selected by `source`, binarizes, and logs
/// the run under the `image_preprocessing` target.
///
/// # Examples
///
/// ```
/// use adaptive_binarization::preprocessing::{
///     apply_adaptive_threshold, GrayscaleImage, StatisticsSource, ThresholdParams,
/// };
///
/// let gray = GrayscaleImage::filled(8, 8, 200).unwrap();
/// let result = apply_adaptive_threshold(
///     &gray,
///     &ThresholdParams::sauvola(3),
///     StatisticsSource::Integral,
/// ).unwrap();
/// assert_eq!(result.white_ratio, 1.0);
/// ```
pub fn apply_adaptive_threshold(
    gray: &GrayscaleImage,
    params: &ThresholdParams,
    source: StatisticsSource,
) -> Result<AdaptiveThresholdResult, PreprocessingError> {
    apply_adaptive_threshold_cancellable(gray, params, source, &CancellationToken::new())
}

/// Same as [`apply_adaptive_threshold`], polling `token` in every parallel stage.
pub fn apply_adaptive_threshold_cancellable(
    gray: &GrayscaleImage,
    params: &ThresholdParams,
    source: StatisticsSource,
    token: &CancellationToken,
) -> Result<AdaptiveThresholdResult, PreprocessingError> {
    let start_time = std::time::Instant::now();
    params.validate()?;

    let mask = match source {
        StatisticsSource::Integral => {
            let table = build_integral_tables_cancellable(gray, token)?;
            binarize_cancellable(gray, params, &table, token)?
        }
        StatisticsSource::Naive => {
            binarize_cancellable(gray, params, &NaiveLocalStatistics::new(gray), token)?
        }
    };

    let processing_time = start_time.elapsed();
    let white_ratio = mask.count_white() as f32 / gray.len() as f32;

    tracing::debug!(
        target: "image_preprocessing",
        "Adaptive thresholding completed in {:.2}ms: method={}, window={}, k={}, R={}, statistics={}, dimensions={}x{}",
        processing_time.as_secs_f64() * 1000.0,
        params.method,
        params.window_size,
        params.k,
        params.r,
        source,
        gray.width(),
        gray.height()
    );
    crate::observability::record_preprocessing_metrics(
        params.method.as_str(),
        processing_time,
        gray.len(),
    );

    Ok(AdaptiveThresholdResult {
        mask,
        params: *params,
        statistics: source,
        white_ratio,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Applies a fixed global threshold and reports timing metadata.
pub fn apply_global_threshold(
    gray: &GrayscaleImage,
    threshold: u8,
) -> Result<ThresholdedImageResult, PreprocessingError> {
    let start_time = std::time::Instant::now();

    let mask = binarize_global(gray, threshold);

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "image_preprocessing",
        "Global thresholding completed in {:.2}ms: threshold={}, dimensions={}x{}",
        processing_time.as_secs_f64() * 1000.0,
        threshold,
        gray.width(),
        gray.height()
    );
    crate::observability::record_preprocessing_metrics("global", processing_time, gray.len());

    Ok(ThresholdedImageResult {
        mask,
        threshold,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}
