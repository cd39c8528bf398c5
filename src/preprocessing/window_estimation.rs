//! # Median Window Estimation Module
//!
//! Picks the adaptive median filter's window bounds from robust global image
//! statistics: a MAD-scaled noise estimate over homogeneous 8x8 blocks and
//! the density of Sobel edges.

use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use rayon::prelude::*;
use tracing;

use super::types::{GrayscaleImage, MedianWindowParams};

/// Converts a MAD into a Gaussian-equivalent standard deviation.
const MAD_TO_SIGMA: f64 = 1.4826;
const BLOCK_SIZE: usize = 8;
/// Blocks with variance below `sigma * HOMOGENEOUS_FACTOR` count as flat.
const HOMOGENEOUS_FACTOR: f64 = 2.0;
/// Gradient magnitudes above `sigma * EDGE_FACTOR` count as edges.
const EDGE_FACTOR: f64 = 1.5;
/// Above this fraction of edge pixels the max window shrinks.
const EDGE_DENSITY_LIMIT: f64 = 0.08;
const LOW_NOISE_LIMIT: f64 = 0.5;
const MEDIUM_NOISE_LIMIT: f64 = 1.5;

const MIN_WINDOW: u32 = 3;
const LOW_NOISE_WINDOW: u32 = 7;
const MEDIUM_NOISE_WINDOW: u32 = 11;
const HIGH_NOISE_WINDOW: u32 = 15;
const EDGE_WINDOW_REDUCTION: u32 = 4;

/// Global statistics behind a window size decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseEstimate {
    /// Median intensity
    pub median: u8,
    /// Median absolute deviation from the median
    pub mad: f64,
    /// Median variance of homogeneous blocks, or `1.4826 * MAD` if none
    pub noise_level: f64,
    /// Number of blocks classified as homogeneous
    pub homogeneous_blocks: usize,
    /// `noise_level / (1.4826 * MAD)`, 0 when the MAD is 0
    pub relative_noise: f64,
    /// Fraction of pixels whose Sobel magnitude exceeds the edge threshold
    pub edge_density: f64,
    /// Resulting window bounds
    pub window: MedianWindowParams,
}

/// Estimates median filter window bounds for `gray`.
///
/// `min_size` is always 3. `max_size` is 7, 11 or 15 for low, medium or high
/// relative noise, reduced by 4 (never below 7) when more than 8% of the
/// pixels sit on edges. A perfectly flat image yields `{3, 7}`.
///
/// # Examples
///
/// ```
/// use adaptive_binarization::preprocessing::{estimate_window_params, GrayscaleImage};
///
/// let flat = GrayscaleImage::filled(32, 32, 90).unwrap();
/// let window = estimate_window_params(&flat);
/// assert_eq!((window.min_size, window.max_size), (3, 7));
/// ```
pub fn estimate_window_params(gray: &GrayscaleImage) -> MedianWindowParams {
    estimate_noise(gray).window
}

/// Computes every intermediate statistic of [`estimate_window_params`].
pub fn estimate_noise(gray: &GrayscaleImage) -> NoiseEstimate {
    let (median, mad) = median_and_mad(gray.as_raw());
    let sigma = MAD_TO_SIGMA * mad;

    let variances = homogeneous_block_variances(gray, sigma * HOMOGENEOUS_FACTOR);
    let homogeneous_blocks = variances.len();
    let noise_level = median_f64(variances).unwrap_or(sigma);

    let edge_density = edge_density(gray, sigma * EDGE_FACTOR);

    let relative_noise = if sigma > 0.0 { noise_level / sigma } else { 0.0 };
    let window = select_window(relative_noise, edge_density);

    tracing::debug!(
        target: "image_preprocessing",
        "Image statistics: median={}, MAD={:.2}, homogeneous_blocks={}",
        median,
        mad,
        homogeneous_blocks
    );
    tracing::debug!(
        target: "image_preprocessing",
        "Estimated relative noise={:.2}, edge density={:.4}, window min={} max={}",
        relative_noise,
        edge_density,
        window.min_size,
        window.max_size
    );

    NoiseEstimate {
        median,
        mad,
        noise_level,
        homogeneous_blocks,
        relative_noise,
        edge_density,
        window,
    }
}

/// Maps relative noise and edge density to window bounds.
pub fn select_window(relative_noise: f64, edge_density: f64) -> MedianWindowParams {
    let mut max_size = if relative_noise < LOW_NOISE_LIMIT {
        LOW_NOISE_WINDOW
    } else if relative_noise < MEDIUM_NOISE_LIMIT {
        MEDIUM_NOISE_WINDOW
    } else {
        HIGH_NOISE_WINDOW
    };

    // Dense detail: keep the support small
    if edge_density > EDGE_DENSITY_LIMIT {
        max_size = max_size
            .saturating_sub(EDGE_WINDOW_REDUCTION)
            .max(LOW_NOISE_WINDOW);
    }

    MedianWindowParams {
        min_size: force_odd(MIN_WINDOW),
        max_size: force_odd(max_size),
    }
}

fn force_odd(size: u32) -> u32 {
    if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

/// Median (upper median for even counts) and MAD via selection.
fn median_and_mad(data: &[u8]) -> (u8, f64) {
    let mut values = data.to_vec();
    let mid = values.len() / 2;
    let (_, median, _) = values.select_nth_unstable(mid);
    let median = *median;

    let mut deviations: Vec<u8> = values.iter().map(|&v| v.abs_diff(median)).collect();
    let (_, mad, _) = deviations.select_nth_unstable(mid);
    (median, *mad as f64)
}

fn median_f64(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mid = values.len() / 2;
    let (_, median, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*median)
}

/// Variances of complete 8x8 blocks strictly below `limit`.
fn homogeneous_block_variances(gray: &GrayscaleImage, limit: f64) -> Vec<f64> {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    let blocks_x = width / BLOCK_SIZE;
    let blocks_y = height / BLOCK_SIZE;
    let block_area = (BLOCK_SIZE * BLOCK_SIZE) as f64;

    (0..blocks_y)
        .into_par_iter()
        .flat_map_iter(|by| {
            (0..blocks_x).filter_map(move |bx| {
                let x0 = bx * BLOCK_SIZE;
                let y0 = by * BLOCK_SIZE;
                let block_rows = || {
                    (y0..y0 + BLOCK_SIZE).flat_map(move |y| &gray.row(y)[x0..x0 + BLOCK_SIZE])
                };

                let mean = block_rows().map(|&v| v as f64).sum::<f64>() / block_area;
                let variance = block_rows()
                    .map(|&v| {
                        let diff = v as f64 - mean;
                        diff * diff
                    })
                    .sum::<f64>()
                    / block_area;

                (variance < limit).then_some(variance)
            })
        })
        .collect()
}

/// Fraction of all pixels whose interior Sobel magnitude exceeds `threshold`.
fn edge_density(gray: &GrayscaleImage, threshold: f64) -> f64 {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    if width < 3 || height < 3 {
        return 0.0;
    }

    let image = gray.to_gray_image();
    let gx = horizontal_sobel(&image);
    let gy = vertical_sobel(&image);
    let gx = gx.as_raw();
    let gy = gy.as_raw();

    let edges: usize = (1..height - 1)
        .into_par_iter()
        .map(|y| {
            (1..width - 1)
                .filter(|&x| {
                    let i = y * width + x;
                    let (dx, dy) = (gx[i] as f64, gy[i] as f64);
                    (dx * dx + dy * dy).sqrt() > threshold
                })
                .count()
        })
        .sum();

    edges as f64 / (width * height) as f64
}
