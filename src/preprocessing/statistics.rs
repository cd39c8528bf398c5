//! # Local Window Statistics
//!
//! Common interface for the local mean/standard deviation providers used by
//! the adaptive binarizer, plus the direct-summation reference provider.

use super::types::{GrayscaleImage, WindowStats};

/// Source of windowed mean and standard deviation.
///
/// Windows are centered on `(x, y)`, span `2 * half_window + 1` pixels per side
/// and are clamped to the image: near the borders the effective area shrinks
/// instead of being padded.
pub trait LocalStatistics: Sync {
    /// Image dimensions `(width, height)` the statistics were computed for.
    fn dimensions(&self) -> (usize, usize);

    /// Mean and standard deviation of the clamped window around `(x, y)`.
    fn local_mean_std(&self, x: usize, y: usize, half_window: usize) -> WindowStats;
}

/// Inclusive window bounds after clamping to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ClampedWindow {
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

impl ClampedWindow {
    pub fn around(
        x: usize,
        y: usize,
        half_window: usize,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            x1: x.saturating_sub(half_window),
            y1: y.saturating_sub(half_window),
            x2: (x + half_window).min(width - 1),
            y2: (y + half_window).min(height - 1),
        }
    }

    pub fn area(&self) -> usize {
        (self.x2 - self.x1 + 1) * (self.y2 - self.y1 + 1)
    }
}

/// Mean/stddev from raw sums, with the variance clamped at zero so that
/// cancellation in `sum_sq / n - mean²` never produces a NaN.
pub(crate) fn stats_from_sums(sum: f64, sum_sq: f64, area: usize) -> WindowStats {
    let area = area as f64;
    let mean = sum / area;
    let variance = (sum_sq / area - mean * mean).max(0.0);
    WindowStats {
        mean,
        stddev: variance.sqrt(),
    }
}

/// Reference statistics computed by summing every window from scratch.
///
/// O(window²) per query. Used to cross-check [`super::IntegralTable`] and as
/// a selectable slow path.
#[derive(Debug, Clone, Copy)]
pub struct NaiveLocalStatistics<'a> {
    image: &'a GrayscaleImage,
}

impl<'a> NaiveLocalStatistics<'a> {
    pub fn new(image: &'a GrayscaleImage) -> Self {
        Self { image }
    }
}

impl LocalStatistics for NaiveLocalStatistics<'_> {
    fn dimensions(&self) -> (usize, usize) {
        (self.image.width() as usize, self.image.height() as usize)
    }

    fn local_mean_std(&self, x: usize, y: usize, half_window: usize) -> WindowStats {
        let (width, height) = self.dimensions();
        let window = ClampedWindow::around(x, y, half_window, width, height);

        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for yy in window.y1..=window.y2 {
            for &v in &self.image.row(yy)[window.x1..=window.x2] {
                let v = v as f64;
                sum += v;
                sum_sq += v * v;
            }
        }

        stats_from_sums(sum, sum_sq, window.area())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_window_shrinks_at_corner() {
        let window = ClampedWindow::around(0, 0, 2, 10, 10);
        assert_eq!(
            window,
            ClampedWindow {
                x1: 0,
                y1: 0,
                x2: 2,
                y2: 2
            }
        );
        assert_eq!(window.area(), 9);
    }

    #[test]
    fn test_window_larger_than_image() {
        let window = ClampedWindow::around(1, 1, 50, 3, 2);
        assert_eq!(window.area(), 6);
    }

    #[test]
    fn test_naive_uniform_image() {
        let img = GrayscaleImage::filled(5, 5, 100).unwrap();
        let stats = NaiveLocalStatistics::new(&img).local_mean_std(2, 2, 1);
        assert_eq!(stats.mean, 100.0);
        assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn test_naive_two_values() {
        // Window over [0, 200] has mean 100 and population stddev 100
        let img = GrayscaleImage::new(2, 1, vec![0, 200]).unwrap();
        let stats = NaiveLocalStatistics::new(&img).local_mean_std(0, 0, 1);
        assert!((stats.mean - 100.0).abs() < 1e-9);
        assert!((stats.stddev - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_stats_from_sums_never_negative() {
        // sum_sq slightly below mean² * n due to rounding
        let stats = stats_from_sums(300.0, 29_999.999_999, 3);
        assert_eq!(stats.stddev, 0.0);
        assert!(!stats.stddev.is_nan());
    }
}
