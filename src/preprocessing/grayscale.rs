//! # Grayscale Conversion Module
//!
//! Projects interleaved RGB(A) buffers onto BT.709 luminance.

use rayon::prelude::*;

use super::types::{GrayscaleImage, PreprocessingError};

const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

/// Converts an interleaved pixel buffer to a single-channel luminance image.
///
/// With three or more channels each pixel becomes
/// `round(0.2126 R + 0.7152 G + 0.0722 B)`; channels past the third (alpha)
/// are ignored. One- and two-channel buffers (gray, gray+alpha) keep their
/// first channel unchanged.
///
/// # Arguments
///
/// * `pixels` - Interleaved samples, `width * height * channels` bytes
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `channels` - Samples per pixel
///
/// # Errors
///
/// Returns `PreprocessingError::UnsupportedChannels` for zero channels,
/// `EmptyImage` for a zero dimension and `BufferSizeMismatch` when the buffer
/// length does not match.
///
/// # Examples
///
/// ```
/// use adaptive_binarization::preprocessing::to_grayscale;
///
/// let rgb = [255u8, 255, 255, 0, 0, 0];
/// let gray = to_grayscale(&rgb, 2, 1, 3).unwrap();
/// assert_eq!(gray.as_raw(), &[255, 0]);
/// ```
pub fn to_grayscale(
    pixels: &[u8],
    width: u32,
    height: u32,
    channels: u8,
) -> Result<GrayscaleImage, PreprocessingError> {
    if channels == 0 {
        return Err(PreprocessingError::UnsupportedChannels { channels });
    }
    if width == 0 || height == 0 {
        return Err(PreprocessingError::EmptyImage { width, height });
    }

    let channels = channels as usize;
    let pixel_count = width as usize * height as usize;
    let expected = pixel_count * channels;
    if pixels.len() != expected {
        return Err(PreprocessingError::BufferSizeMismatch {
            expected,
            actual: pixels.len(),
        });
    }

    let mut gray = vec![0u8; pixel_count];
    if channels < 3 {
        gray.par_iter_mut()
            .zip(pixels.par_chunks_exact(channels))
            .for_each(|(out, px)| *out = px[0]);
    } else {
        gray.par_iter_mut()
            .zip(pixels.par_chunks_exact(channels))
            .for_each(|(out, px)| *out = luminance(px[0], px[1], px[2]));
    }

    GrayscaleImage::new(width, height, gray)
}

/// BT.709 luminance of one RGB triple, rounded and clamped to a byte.
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let y = LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminance_weights() {
        assert_eq!(luminance(0, 0, 0), 0);
        assert_eq!(luminance(255, 255, 255), 255);
        // 0.2126 * 255 = 54.2
        assert_eq!(luminance(255, 0, 0), 54);
        // 0.7152 * 255 = 182.4
        assert_eq!(luminance(0, 255, 0), 182);
        // 0.0722 * 255 = 18.4
        assert_eq!(luminance(0, 0, 255), 18);
    }

    #[test]
    fn test_gray_values_survive_projection() {
        for v in [0u8, 1, 17, 100, 128, 200, 254, 255] {
            assert_eq!(luminance(v, v, v), v);
        }
    }

    #[test]
    fn test_alpha_channel_ignored() {
        let rgba = [10u8, 10, 10, 0, 10, 10, 10, 255];
        let gray = to_grayscale(&rgba, 2, 1, 4).unwrap();
        assert_eq!(gray.as_raw(), &[10, 10]);
    }

    #[test]
    fn test_single_and_dual_channel_pass_through() {
        let gray = to_grayscale(&[7, 8, 9, 10], 2, 2, 1).unwrap();
        assert_eq!(gray.as_raw(), &[7, 8, 9, 10]);

        let gray_alpha = to_grayscale(&[7, 255, 8, 0], 2, 1, 2).unwrap();
        assert_eq!(gray_alpha.as_raw(), &[7, 8]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(
            to_grayscale(&[0; 12], 2, 2, 0),
            Err(PreprocessingError::UnsupportedChannels { channels: 0 })
        );
        assert_eq!(
            to_grayscale(&[], 0, 2, 3),
            Err(PreprocessingError::EmptyImage {
                width: 0,
                height: 2
            })
        );
        assert_eq!(
            to_grayscale(&[0; 11], 2, 2, 3),
            Err(PreprocessingError::BufferSizeMismatch {
                expected: 12,
                actual: 11
            })
        );
    }
}
