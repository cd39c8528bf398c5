//! # Shared Types for Image Preprocessing
//!
//! This module contains the shared image containers, parameter structs, result
//! types and the error enum used across the preprocessing sub-modules.

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

/// Errors that can occur during image preprocessing operations.
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessingError {
    /// Width or height is zero
    EmptyImage { width: u32, height: u32 },
    /// Pixel buffer length does not match the declared dimensions
    BufferSizeMismatch { expected: usize, actual: usize },
    /// Channel count not supported by the grayscale converter
    UnsupportedChannels { channels: u8 },
    /// Window size is even or below the allowed minimum
    InvalidWindowSize { size: u32, minimum: u32 },
    /// Median window bounds are inconsistent
    InvalidWindowBounds { min_size: u32, max_size: u32 },
    /// Threshold parameter out of range
    InvalidParameter { name: &'static str, value: f64 },
    /// Operation was cancelled through its cancellation token
    Cancelled,
    /// Image processing operation failed
    ProcessingFailed { message: String },
}

impl std::fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessingError::EmptyImage { width, height } => {
                write!(f, "Image has no pixels: {}x{}", width, height)
            }
            PreprocessingError::BufferSizeMismatch { expected, actual } => {
                write!(
                    f,
                    "Pixel buffer has {} bytes, expected {} for the given dimensions",
                    actual, expected
                )
            }
            PreprocessingError::UnsupportedChannels { channels } => {
                write!(
                    f,
                    "Unsupported channel count: {}. Expected 1, 2, 3 or 4 or more",
                    channels
                )
            }
            PreprocessingError::InvalidWindowSize { size, minimum } => {
                write!(
                    f,
                    "Invalid window size: {}. Must be odd and at least {}",
                    size, minimum
                )
            }
            PreprocessingError::InvalidWindowBounds { min_size, max_size } => {
                write!(
                    f,
                    "Invalid median window bounds: min={}, max={}. Both must be odd and min <= max",
                    min_size, max_size
                )
            }
            PreprocessingError::InvalidParameter { name, value } => {
                write!(f, "Invalid value for parameter '{}': {}", name, value)
            }
            PreprocessingError::Cancelled => write!(f, "Image processing was cancelled"),
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

fn check_dimensions(width: u32, height: u32, actual: usize) -> Result<(), PreprocessingError> {
    if width == 0 || height == 0 {
        return Err(PreprocessingError::EmptyImage { width, height });
    }
    let expected = width as usize * height as usize;
    if actual != expected {
        return Err(PreprocessingError::BufferSizeMismatch { expected, actual });
    }
    Ok(())
}

/// Single-channel 8-bit image stored row-major.
///
/// The buffer length always equals `width * height` and both dimensions are
/// non-zero, so every accessor below can index without further checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayscaleImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl GrayscaleImage {
    /// Wraps a row-major luminance buffer.
    ///
    /// # Errors
    ///
    /// Returns `PreprocessingError::EmptyImage` for a zero dimension and
    /// `PreprocessingError::BufferSizeMismatch` when `data.len() != width * height`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PreprocessingError> {
        check_dimensions(width, height, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Creates an image where every pixel has the same intensity.
    pub fn filled(width: u32, height: u32, value: u8) -> Result<Self, PreprocessingError> {
        Self::new(width, height, vec![value; width as usize * height as usize])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels in the image.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false: a `GrayscaleImage` has at least one pixel.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Intensity at `(x, y)`, or `None` outside the image.
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.data[y as usize * self.width as usize + x as usize])
        } else {
            None
        }
    }

    /// Intensity at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the image.
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        assert!(
            x < self.width as usize && y < self.height as usize,
            "pixel ({}, {}) outside {}x{} image",
            x,
            y,
            self.width,
            self.height
        );
        self.data[y * self.width as usize + x]
    }

    /// One row of pixels.
    pub fn row(&self, y: usize) -> &[u8] {
        let width = self.width as usize;
        &self.data[y * width..(y + 1) * width]
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Sum of all intensities.
    pub fn total_intensity(&self) -> u64 {
        self.data.iter().map(|&v| v as u64).sum()
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
            .expect("buffer length matches dimensions by construction")
    }
}

impl TryFrom<GrayImage> for GrayscaleImage {
    type Error = PreprocessingError;

    fn try_from(image: GrayImage) -> Result<Self, Self::Error> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }
}

impl TryFrom<&DynamicImage> for GrayscaleImage {
    type Error = PreprocessingError;

    /// Converts through the BT.709 luminance projection used for raw buffers.
    fn try_from(image: &DynamicImage) -> Result<Self, Self::Error> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        super::grayscale::to_grayscale(rgba.as_raw(), width, height, 4)
    }
}

/// Black/white mask where every value is 0 or 255.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BinaryMask {
    /// Foreground/background values stored in the mask.
    pub const WHITE: u8 = 255;
    pub const BLACK: u8 = 0;

    /// Wraps a buffer produced by one of the binarizers.
    pub(crate) fn from_parts(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        debug_assert!(data.iter().all(|&v| v == Self::WHITE || v == Self::BLACK));
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.data[y as usize * self.width as usize + x as usize])
        } else {
            None
        }
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Number of white (255) pixels.
    pub fn count_white(&self) -> usize {
        self.data.iter().filter(|&&v| v == Self::WHITE).count()
    }

    /// Reinterprets the mask as a grayscale image, e.g. to re-threshold it.
    pub fn to_grayscale(&self) -> GrayscaleImage {
        GrayscaleImage {
            width: self.width,
            height: self.height,
            data: self.data.clone(),
        }
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
            .expect("buffer length matches dimensions by construction")
    }
}

/// Mean and standard deviation of a clamped window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    /// Always >= 0
    pub stddev: f64,
}

/// Adaptive threshold methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    /// `T = mean * (1 + k * (stddev / R - 1))`
    Sauvola,
    /// `T = mean + k * stddev`, with `k` usually negative
    Nick,
}

impl ThresholdMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdMethod::Sauvola => "sauvola",
            ThresholdMethod::Nick => "nick",
        }
    }
}

impl std::fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThresholdMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sauvola" => Ok(ThresholdMethod::Sauvola),
            "nick" => Ok(ThresholdMethod::Nick),
            other => Err(format!(
                "Unknown threshold method '{}'. Expected 'sauvola' or 'nick'",
                other
            )),
        }
    }
}

/// Parameters of an adaptive threshold run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdParams {
    pub method: ThresholdMethod,
    /// Odd window side length, at least 3
    pub window_size: u32,
    /// Sensitivity; its sign selects the direction for Nick
    pub k: f64,
    /// Dynamic range of the standard deviation (Sauvola only)
    pub r: f64,
}

impl ThresholdParams {
    pub const MIN_WINDOW_SIZE: u32 = 3;
    pub const DEFAULT_WINDOW_SIZE: u32 = 15;
    pub const DEFAULT_SAUVOLA_K: f64 = 0.2;
    pub const DEFAULT_NICK_K: f64 = -0.2;
    pub const DEFAULT_R: f64 = 128.0;

    /// Sauvola with the usual document defaults (k = 0.2, R = 128).
    pub fn sauvola(window_size: u32) -> Self {
        Self {
            method: ThresholdMethod::Sauvola,
            window_size,
            k: Self::DEFAULT_SAUVOLA_K,
            r: Self::DEFAULT_R,
        }
    }

    /// Nick with k = -0.2.
    pub fn nick(window_size: u32) -> Self {
        Self {
            method: ThresholdMethod::Nick,
            window_size,
            k: Self::DEFAULT_NICK_K,
            r: Self::DEFAULT_R,
        }
    }

    pub fn with_k(mut self, k: f64) -> Self {
        self.k = k;
        self
    }

    pub fn with_r(mut self, r: f64) -> Self {
        self.r = r;
        self
    }

    pub fn half_window(&self) -> usize {
        (self.window_size / 2) as usize
    }

    /// Checks window parity and the numeric parameters.
    pub fn validate(&self) -> Result<(), PreprocessingError> {
        if self.window_size < Self::MIN_WINDOW_SIZE || self.window_size % 2 == 0 {
            return Err(PreprocessingError::InvalidWindowSize {
                size: self.window_size,
                minimum: Self::MIN_WINDOW_SIZE,
            });
        }
        if !self.k.is_finite() {
            return Err(PreprocessingError::InvalidParameter {
                name: "k",
                value: self.k,
            });
        }
        if self.method == ThresholdMethod::Sauvola && !(self.r.is_finite() && self.r > 0.0) {
            return Err(PreprocessingError::InvalidParameter {
                name: "R",
                value: self.r,
            });
        }
        Ok(())
    }
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self::sauvola(Self::DEFAULT_WINDOW_SIZE)
    }
}

/// Window bounds for the adaptive median filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedianWindowParams {
    pub min_size: u32,
    pub max_size: u32,
}

impl MedianWindowParams {
    pub fn new(min_size: u32, max_size: u32) -> Result<Self, PreprocessingError> {
        let params = Self { min_size, max_size };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), PreprocessingError> {
        if self.min_size == 0
            || self.min_size % 2 == 0
            || self.max_size % 2 == 0
            || self.min_size > self.max_size
        {
            return Err(PreprocessingError::InvalidWindowBounds {
                min_size: self.min_size,
                max_size: self.max_size,
            });
        }
        Ok(())
    }
}

/// Which local statistics engine feeds the adaptive binarizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticsSource {
    /// Summed-area tables, O(1) per pixel
    #[default]
    Integral,
    /// Direct window summation, O(window²) per pixel
    Naive,
}

impl std::str::FromStr for StatisticsSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "integral" => Ok(StatisticsSource::Integral),
            "naive" => Ok(StatisticsSource::Naive),
            other => Err(format!(
                "Unknown statistics source '{}'. Expected 'integral' or 'naive'",
                other
            )),
        }
    }
}

impl std::fmt::Display for StatisticsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatisticsSource::Integral => f.write_str("integral"),
            StatisticsSource::Naive => f.write_str("naive"),
        }
    }
}

/// Result of an adaptive (Sauvola/Nick) thresholding operation.
#[derive(Debug, Clone)]
pub struct AdaptiveThresholdResult {
    /// The binary mask
    pub mask: BinaryMask,
    /// Parameters the mask was produced with
    pub params: ThresholdParams,
    /// Statistics engine used for the local windows
    pub statistics: StatisticsSource,
    /// Fraction of white pixels (0.0-1.0)
    pub white_ratio: f32,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of a fixed global threshold operation.
#[derive(Debug, Clone)]
pub struct ThresholdedImageResult {
    /// The binary mask
    pub mask: BinaryMask,
    /// Threshold applied (pixels strictly above it become white)
    pub threshold: u8,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of adaptive median denoising.
#[derive(Debug, Clone)]
pub struct DenoisedImageResult {
    /// The denoised image
    pub image: GrayscaleImage,
    /// Window bounds used, estimated or supplied
    pub window: MedianWindowParams,
    /// Whether the bounds were estimated from the image
    pub estimated: bool,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}
