//! # Image File I/O
//!
//! Loading of input images into interleaved 8-bit buffers, encoding of
//! results by file extension, and output path generation.
//!
//! | Extension      | Encoding                               |
//! |----------------|----------------------------------------|
//! | `.png`         | PNG                                    |
//! | `.jpg`/`.jpeg` | JPEG, quality 90                       |
//! | `.ppm`         | ASCII PPM (P3), gray replicated to RGB |
//! | anything else  | PNG bytes under the requested name     |

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{DynamicImage, ImageBuffer, ImageFormat};
use tracing::{debug, info, warn};

use crate::errors::{error_logging, AppError, AppResult};
use crate::observability::{io_span, record_io_metrics};
use crate::preprocessing::{to_grayscale, GrayscaleImage, PreprocessingError};

/// JPEG quality used for `.jpg`/`.jpeg` outputs
pub const JPEG_QUALITY: u8 = 90;

/// Number of leading bytes inspected for format detection
const FORMAT_PROBE_LEN: usize = 32;

/// Decoded image as an interleaved 8-bit buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 1 (gray), 2 (gray + alpha), 3 (RGB) or 4 (RGBA)
    pub channels: u8,
}

impl RawImage {
    /// Converts to a single-channel luminance image
    pub fn to_grayscale(&self) -> Result<GrayscaleImage, PreprocessingError> {
        to_grayscale(&self.pixels, self.width, self.height, self.channels)
    }
}

/// Output encoding chosen from a file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    Png,
    Jpeg,
    PpmAscii,
    /// Unknown extension, written as PNG
    PngFallback,
}

impl OutputEncoding {
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match extension.as_deref() {
            Some("png") => OutputEncoding::Png,
            Some("jpg") | Some("jpeg") => OutputEncoding::Jpeg,
            Some("ppm") => OutputEncoding::PpmAscii,
            _ => OutputEncoding::PngFallback,
        }
    }
}

/// Validate that `path` points to a readable, non-empty file within the size limit
pub fn validate_image_path(path: &Path, max_file_size: u64) -> AppResult<u64> {
    if path.as_os_str().is_empty() {
        return Err(AppError::Validation("Image path cannot be empty".to_string()));
    }

    // Check if file exists
    if !path.exists() {
        return Err(AppError::Validation(format!(
            "Image path validation failed: file does not exist ({})",
            path.display()
        )));
    }

    // Check if it's actually a file (not a directory)
    if !path.is_file() {
        return Err(AppError::Validation(format!(
            "Image path validation failed: path is not a file ({})",
            path.display()
        )));
    }

    // Check file size
    let metadata = path.metadata().map_err(|e| {
        AppError::FileSystem(format!(
            "Image validation failed: cannot read file metadata ({}) - {}",
            path.display(),
            e
        ))
    })?;
    let file_size = metadata.len();
    if file_size == 0 {
        return Err(AppError::Validation(format!(
            "Image validation failed: file is empty ({})",
            path.display()
        )));
    }
    if file_size > max_file_size {
        return Err(AppError::Validation(format!(
            "Image validation failed: file too large ({} bytes, maximum allowed: {} bytes)",
            file_size, max_file_size
        )));
    }

    Ok(file_size)
}

/// Detect the image format from magic bytes
///
/// Only formats the decoder is built with are accepted.
pub fn detect_image_format(path: &Path) -> AppResult<ImageFormat> {
    let mut file = File::open(path)?;
    let mut header = [0u8; FORMAT_PROBE_LEN];
    let read = file.read(&mut header)?;

    let format = image::guess_format(&header[..read]).map_err(|_| {
        AppError::Validation(format!(
            "Unrecognized image format ({})",
            path.display()
        ))
    })?;

    match format {
        ImageFormat::Png
        | ImageFormat::Jpeg
        | ImageFormat::Pnm
        | ImageFormat::Bmp
        | ImageFormat::Tiff
        | ImageFormat::Gif => Ok(format),
        other => Err(AppError::Validation(format!(
            "Unsupported image format {:?} ({})",
            other,
            path.display()
        ))),
    }
}

/// Load an image file into an interleaved 8-bit buffer
///
/// 8-bit gray, gray+alpha, RGB and RGBA images keep their channel count;
/// deeper formats are converted to 8-bit RGBA.
pub fn load_image(path: &Path, max_file_size: u64) -> AppResult<RawImage> {
    let path_display = path.display().to_string();
    let span = io_span("load", &path_display);
    let _guard = span.enter();

    let result = validate_image_path(path, max_file_size).and_then(|file_size| {
        let format = detect_image_format(path)?;
        let bytes = std::fs::read(path)?;
        let decoded = image::load_from_memory_with_format(&bytes, format)?;
        debug!(
            path = %path_display,
            format = ?format,
            file_size = file_size,
            "Decoded image"
        );
        Ok((raw_from_dynamic(decoded), file_size))
    });

    match result {
        Ok((raw, file_size)) => {
            record_io_metrics("load", true, file_size);
            info!(
                path = %path_display,
                width = raw.width,
                height = raw.height,
                channels = raw.channels,
                "Loaded image"
            );
            Ok(raw)
        }
        Err(e) => {
            record_io_metrics("load", false, 0);
            match &e {
                AppError::Validation(_) => error_logging::log_validation_error(
                    &e,
                    "load_image",
                    "image_path",
                    Some(&path_display),
                ),
                _ => error_logging::log_filesystem_error(
                    &e,
                    "load_image",
                    Some(&path_display),
                    None,
                ),
            }
            Err(e)
        }
    }
}

fn raw_from_dynamic(image: DynamicImage) -> RawImage {
    let (width, height) = (image.width(), image.height());
    let (pixels, channels) = match image {
        DynamicImage::ImageLuma8(buf) => (buf.into_raw(), 1),
        DynamicImage::ImageLumaA8(buf) => (buf.into_raw(), 2),
        DynamicImage::ImageRgb8(buf) => (buf.into_raw(), 3),
        DynamicImage::ImageRgba8(buf) => (buf.into_raw(), 4),
        other => (other.to_rgba8().into_raw(), 4),
    };
    RawImage {
        pixels,
        width,
        height,
        channels,
    }
}

fn dynamic_from_raw(pixels: &[u8], width: u32, height: u32, channels: u8) -> AppResult<DynamicImage> {
    let data = pixels.to_vec();
    let image = match channels {
        1 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
        2 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
        3 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        4 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
        _ => {
            return Err(AppError::Validation(format!(
                "Unsupported channel count: {}",
                channels
            )))
        }
    };

    image.ok_or_else(|| {
        AppError::Validation(format!(
            "Pixel buffer of {} bytes does not match {}x{}x{}",
            pixels.len(),
            width,
            height,
            channels
        ))
    })
}

/// Encode `pixels` to `path`, choosing the encoding from the extension
pub fn save_image(
    path: &Path,
    pixels: &[u8],
    width: u32,
    height: u32,
    channels: u8,
) -> AppResult<()> {
    let path_display = path.display().to_string();
    let span = io_span("save", &path_display);
    let _guard = span.enter();

    let encoding = OutputEncoding::from_path(path);
    let result = dynamic_from_raw(pixels, width, height, channels)
        .and_then(|image| write_encoded(path, &image, encoding));

    match result {
        Ok(written) => {
            record_io_metrics("save", true, written);
            info!(
                path = %path_display,
                encoding = ?encoding,
                bytes = written,
                "Wrote image"
            );
            Ok(())
        }
        Err(e) => {
            record_io_metrics("save", false, 0);
            error_logging::log_filesystem_error(&e, "save_image", Some(&path_display), None);
            Err(e)
        }
    }
}

/// Save a grayscale image or binary mask buffer (one channel)
pub fn save_gray(path: &Path, pixels: &[u8], width: u32, height: u32) -> AppResult<()> {
    save_image(path, pixels, width, height, 1)
}

/// Encodes in memory first, so a failed encode leaves `path` untouched
fn write_encoded(path: &Path, image: &DynamicImage, encoding: OutputEncoding) -> AppResult<u64> {
    let mut buffer = Cursor::new(Vec::new());

    match encoding {
        OutputEncoding::Png => image.write_to(&mut buffer, ImageFormat::Png)?,
        OutputEncoding::PngFallback => {
            warn!(
                path = %path.display(),
                "Unknown output extension, writing PNG data"
            );
            image.write_to(&mut buffer, ImageFormat::Png)?
        }
        OutputEncoding::Jpeg => {
            // JPEG has no alpha channel
            let flattened = if image.color().has_color() {
                DynamicImage::ImageRgb8(image.to_rgb8())
            } else {
                DynamicImage::ImageLuma8(image.to_luma8())
            };
            flattened.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY))?
        }
        OutputEncoding::PpmAscii => {
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            let encoder = PnmEncoder::new(&mut buffer)
                .with_subtype(PnmSubtype::Pixmap(SampleEncoding::Ascii));
            rgb.write_with_encoder(encoder)?
        }
    }

    let bytes = buffer.into_inner();
    std::fs::write(path, &bytes)?;
    Ok(bytes.len() as u64)
}

/// Build `<results_dir>/<stem>_bin[_<method>]<.ext>`, creating `results_dir`
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use adaptive_binarization::image_io::make_output_path;
///
/// let dir = tempfile::tempdir().unwrap();
/// let out = make_output_path(Path::new("scans/page.png"), dir.path(), Some("sauvola")).unwrap();
/// assert_eq!(out, dir.path().join("page_bin_sauvola.png"));
/// ```
pub fn make_output_path(input: &Path, results_dir: &Path, method: Option<&str>) -> AppResult<PathBuf> {
    if !results_dir.exists() {
        std::fs::create_dir_all(results_dir).map_err(|e| {
            AppError::FileSystem(format!(
                "Failed to create results directory {}: {}",
                results_dir.display(),
                e
            ))
        })?;
        info!(path = %results_dir.display(), "Created results directory");
    }

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Input path has no file name: {}",
                input.display()
            ))
        })?;

    let mut file_name = format!("{}_bin", stem);
    if let Some(method) = method.filter(|m| !m.is_empty()) {
        file_name.push('_');
        file_name.push_str(method);
    }
    if let Some(ext) = input.extension().and_then(|e| e.to_str()) {
        file_name.push('.');
        file_name.push_str(ext);
    }

    let output = results_dir.join(file_name);
    debug!(path = %output.display(), "Output path created");
    Ok(output)
}
