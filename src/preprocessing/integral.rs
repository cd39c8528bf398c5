//! # Integral Image Module
//!
//! Summed-area tables for intensity and squared intensity. After a two-pass
//! build, the sum over any axis-aligned rectangle costs four lookups, which
//! makes windowed mean/variance O(1) per pixel regardless of window size.

use std::convert::Infallible;

use rayon::prelude::*;

use super::cancellation::CancellationToken;
use super::statistics::{stats_from_sums, ClampedWindow, LocalStatistics};
use super::types::{GrayscaleImage, PreprocessingError, WindowStats};

/// Summed-area tables of an image.
///
/// Stored column major: `sum[x * height + y]` holds the total intensity of
/// the rectangle `(0, 0)-(x, y)` inclusive and `sum_sq` the total squared
/// intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegralTable {
    width: usize,
    height: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

/// Builds the summed-area tables of `gray`.
///
/// Row pass (parallel over rows) followed by a column pass (parallel over
/// columns, sequential down each column). The passes are separated by a
/// single barrier.
pub fn build_integral_tables(gray: &GrayscaleImage) -> IntegralTable {
    match build_with(gray, || Ok::<(), Infallible>(())) {
        Ok(table) => table,
        Err(never) => match never {},
    }
}

/// Same as [`build_integral_tables`], polling `token` between rows and
/// columns.
pub fn build_integral_tables_cancellable(
    gray: &GrayscaleImage,
    token: &CancellationToken,
) -> Result<IntegralTable, PreprocessingError> {
    build_with(gray, || token.check())
}

fn build_with<E, F>(gray: &GrayscaleImage, poll: F) -> Result<IntegralTable, E>
where
    E: Send,
    F: Fn() -> Result<(), E> + Sync,
{
    let width = gray.width() as usize;
    let height = gray.height() as usize;

    // Row pass: prefix sums along x, one task per row
    let mut row_sum = vec![0.0f64; width * height];
    let mut row_sum_sq = vec![0.0f64; width * height];
    row_sum
        .par_chunks_mut(width)
        .zip(row_sum_sq.par_chunks_mut(width))
        .zip(gray.as_raw().par_chunks(width))
        .try_for_each(|((row, row_sq), src)| {
            poll()?;
            let mut acc = 0.0f64;
            let mut acc_sq = 0.0f64;
            for ((s, sq), &v) in row.iter_mut().zip(row_sq.iter_mut()).zip(src) {
                let v = v as f64;
                acc += v;
                acc_sq += v * v;
                *s = acc;
                *sq = acc_sq;
            }
            Ok::<(), E>(())
        })?;

    // Column pass: prefix sums of the row sums along y, one task per column.
    // The table is column major so each task owns one contiguous chunk.
    let mut sum = vec![0.0f64; width * height];
    let mut sum_sq = vec![0.0f64; width * height];
    sum.par_chunks_mut(height)
        .zip(sum_sq.par_chunks_mut(height))
        .enumerate()
        .try_for_each(|(x, (column, column_sq))| {
            poll()?;
            let mut acc = 0.0f64;
            let mut acc_sq = 0.0f64;
            for (y, (s, sq)) in column.iter_mut().zip(column_sq.iter_mut()).enumerate() {
                acc += row_sum[y * width + x];
                acc_sq += row_sum_sq[y * width + x];
                *s = acc;
                *sq = acc_sq;
            }
            Ok::<(), E>(())
        })?;

    tracing::trace!(
        target: "image_preprocessing",
        "Integral tables built: dimensions={}x{}",
        width,
        height
    );

    Ok(IntegralTable {
        width,
        height,
        sum,
        sum_sq,
    })
}

impl IntegralTable {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Cumulative sum at `(x, y)`.
    pub fn sum_at(&self, x: usize, y: usize) -> f64 {
        self.sum[self.index(x, y)]
    }

    /// Cumulative squared sum at `(x, y)`.
    pub fn sum_sq_at(&self, x: usize, y: usize) -> f64 {
        self.sum_sq[self.index(x, y)]
    }

    /// Total intensity of the rectangle `(x1, y1)-(x2, y2)` inclusive.
    ///
    /// Corners are clamped to the image; a rectangle that ends up empty after
    /// clamping sums to zero.
    pub fn get_sum(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> f64 {
        self.query(&self.sum, x1, y1, x2, y2)
    }

    /// Total squared intensity of the rectangle `(x1, y1)-(x2, y2)` inclusive.
    pub fn get_sum_sq(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> f64 {
        self.query(&self.sum_sq, x1, y1, x2, y2)
    }

    fn query(&self, table: &[f64], x1: i64, y1: i64, x2: i64, y2: i64) -> f64 {
        let x1 = x1.max(0) as usize;
        let y1 = y1.max(0) as usize;
        let x2 = x2.min(self.width as i64 - 1);
        let y2 = y2.min(self.height as i64 - 1);
        if x2 < 0 || y2 < 0 || x1 > x2 as usize || y1 > y2 as usize {
            return 0.0;
        }
        self.rect(table, x1, y1, x2 as usize, y2 as usize)
    }

    fn index(&self, x: usize, y: usize) -> usize {
        x * self.height + y
    }

    /// Inclusion-exclusion over an already clamped, non-empty rectangle.
    fn rect(&self, table: &[f64], x1: usize, y1: usize, x2: usize, y2: usize) -> f64 {
        let d = table[self.index(x2, y2)];
        let a = if x1 > 0 && y1 > 0 {
            table[self.index(x1 - 1, y1 - 1)]
        } else {
            0.0
        };
        let b = if y1 > 0 { table[self.index(x2, y1 - 1)] } else { 0.0 };
        let c = if x1 > 0 { table[self.index(x1 - 1, y2)] } else { 0.0 };
        d + a - b - c
    }
}

impl LocalStatistics for IntegralTable {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn local_mean_std(&self, x: usize, y: usize, half_window: usize) -> WindowStats {
        let window = ClampedWindow::around(x, y, half_window, self.width, self.height);
        let sum = self.rect(&self.sum, window.x1, window.y1, window.x2, window.y2);
        let sum_sq = self.rect(&self.sum_sq, window.x1, window.y1, window.x2, window.y2);
        stats_from_sums(sum, sum_sq, window.area())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32) -> GrayscaleImage {
        let data = (0..width * height).map(|i| (i % 256) as u8).collect();
        GrayscaleImage::new(width, height, data).unwrap()
    }

    #[test]
    fn test_bottom_right_is_total() {
        let img = ramp(13, 7);
        let table = build_integral_tables(&img);
        assert_eq!(table.sum_at(12, 6), img.total_intensity() as f64);

        let total_sq: f64 = img.as_raw().iter().map(|&v| (v as f64).powi(2)).sum();
        assert_eq!(table.sum_sq_at(12, 6), total_sq);
    }

    #[test]
    fn test_small_table_values() {
        // 1 2
        // 3 4
        let img = GrayscaleImage::new(2, 2, vec![1, 2, 3, 4]).unwrap();
        let table = build_integral_tables(&img);
        assert_eq!(table.sum_at(0, 0), 1.0);
        assert_eq!(table.sum_at(1, 0), 3.0);
        assert_eq!(table.sum_at(0, 1), 4.0);
        assert_eq!(table.sum_at(1, 1), 10.0);
        assert_eq!(table.sum_sq_at(1, 1), 30.0);
    }

    #[test]
    fn test_get_sum_single_pixels_and_strips() {
        let img = ramp(6, 5);
        let table = build_integral_tables(&img);
        for y in 0..5i64 {
            for x in 0..6i64 {
                let expected = img.pixel(x as usize, y as usize) as f64;
                assert_eq!(table.get_sum(x, y, x, y), expected);
            }
        }
        let row_two: f64 = img.row(2).iter().map(|&v| v as f64).sum();
        assert_eq!(table.get_sum(0, 2, 5, 2), row_two);
    }

    #[test]
    fn test_get_sum_clamps_out_of_range_corners() {
        let img = ramp(4, 4);
        let table = build_integral_tables(&img);
        let total = img.total_intensity() as f64;
        assert_eq!(table.get_sum(-10, -10, 100, 100), total);
        assert_eq!(table.get_sum(10, 10, 20, 20), 0.0);
        assert_eq!(table.get_sum(-5, -5, -1, -1), 0.0);
    }

    #[test]
    fn test_local_mean_std_uses_clamped_area() {
        let img = GrayscaleImage::filled(5, 5, 100).unwrap();
        let table = build_integral_tables(&img);
        // Corner window covers 2x2 pixels; a padded area would pull the mean down
        let stats = table.local_mean_std(0, 0, 1);
        assert_eq!(stats.mean, 100.0);
        assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn test_single_row_and_column_images() {
        let row = GrayscaleImage::new(4, 1, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(build_integral_tables(&row).sum_at(3, 0), 10.0);

        let column = GrayscaleImage::new(1, 4, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(build_integral_tables(&column).sum_at(0, 3), 10.0);
    }

    #[test]
    fn test_matches_sequential_recurrence() {
        for (width, height) in [(37u32, 11u32), (3, 90), (1100, 4)] {
            let img = ramp(width, height);
            let (w, h) = (width as usize, height as usize);
            let mut expected = vec![0.0f64; w * h];
            for y in 0..h {
                for x in 0..w {
                    let left = if x > 0 { expected[y * w + x - 1] } else { 0.0 };
                    let up = if y > 0 { expected[(y - 1) * w + x] } else { 0.0 };
                    let diag = if x > 0 && y > 0 {
                        expected[(y - 1) * w + x - 1]
                    } else {
                        0.0
                    };
                    expected[y * w + x] = img.pixel(x, y) as f64 + left + up - diag;
                }
            }

            let table = build_integral_tables(&img);
            for y in 0..h {
                for x in 0..w {
                    assert_eq!(table.sum_at(x, y), expected[y * w + x], "{}x{} at ({}, {})", w, h, x, y);
                }
            }
        }
    }

    #[test]
    fn test_same_table_on_any_thread_count() {
        let img = ramp(131, 57);
        let build = |threads: usize| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap()
                .install(|| build_integral_tables(&img))
        };
        let single = build(1);
        assert_eq!(build(4), single);
    }

    #[test]
    fn test_cancelled_build() {
        let img = ramp(8, 8);
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            build_integral_tables_cancellable(&img, &token),
            Err(PreprocessingError::Cancelled)
        );
    }
}
