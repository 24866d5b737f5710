//! Upload validation and resizing toward the range search backends match best.
//!
//! Decoding is the only step of an analysis that can fail the whole request:
//! an image that cannot be decoded cannot be searched.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use bookleak_common::BookLeakError;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Longest side above which images are scaled down.
pub const MAX_DIMENSION: u32 = 2048;

/// Longest side below which images are scaled up.
pub const MIN_DIMENSION: u32 = 300;

const JPEG_QUALITY: u8 = 90;

const ACCEPTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Whether the bytes differ from the upload.
    pub resized: bool,
}

/// Check size and format without decoding.
pub fn validate_upload(bytes: &[u8]) -> Result<ImageFormat, BookLeakError> {
    if bytes.is_empty() {
        return Err(BookLeakError::UnsupportedImage("empty file".into()));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(BookLeakError::UnsupportedImage(format!(
            "{} bytes exceeds the {} byte limit",
            bytes.len(),
            MAX_UPLOAD_BYTES
        )));
    }
    let format = image::guess_format(bytes)
        .map_err(|_| BookLeakError::UnsupportedImage("unrecognized image format".into()))?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(BookLeakError::UnsupportedImage(format!("{format:?} is not accepted")));
    }
    Ok(format)
}

/// MIME type for an accepted format.
pub fn content_type(format: ImageFormat) -> &'static str {
    format.to_mime_type()
}

/// Validate, decode and, when outside the sweet spot, rescale and re-encode
/// as JPEG.
pub fn prepare_image(bytes: &[u8]) -> Result<PreparedImage, BookLeakError> {
    let format = validate_upload(bytes)?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| BookLeakError::ImageDecode(e.to_string()))?;
    let (width, height) = decoded.dimensions();
    let long_side = width.max(height);

    let target = if long_side > MAX_DIMENSION {
        Some(MAX_DIMENSION)
    } else if long_side < MIN_DIMENSION {
        Some(MIN_DIMENSION)
    } else {
        None
    };

    let Some(target) = target else {
        return Ok(PreparedImage {
            bytes: bytes.to_vec(),
            format,
            width,
            height,
            resized: false,
        });
    };

    let (new_w, new_h) = scaled_dimensions(width, height, target);
    let resized = decoded.resize_exact(new_w, new_h, FilterType::Lanczos3);
    tracing::debug!(width, height, new_w, new_h, "Rescaled image for search");

    Ok(PreparedImage {
        bytes: encode_jpeg(&resized)?,
        format: ImageFormat::Jpeg,
        width: new_w,
        height: new_h,
        resized: true,
    })
}

/// Scale so the longest side equals `target`, keeping the aspect ratio.
fn scaled_dimensions(width: u32, height: u32, target: u32) -> (u32, u32) {
    let long_side = width.max(height).max(1) as f64;
    let factor = target as f64 / long_side;
    let scale = |side: u32| ((side as f64 * factor).round() as u32).max(1);
    (scale(width), scale(height))
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, BookLeakError> {
    let rgb = image.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| BookLeakError::ImageDecode(format!("re-encode failed: {e}")))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgb};

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([200u8, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn mid_sized_images_pass_through() {
        let bytes = png(500, 400);
        let prepared = prepare_image(&bytes).unwrap();
        assert!(!prepared.resized);
        assert_eq!(prepared.format, ImageFormat::Png);
        assert_eq!(prepared.bytes, bytes);
    }

    #[test]
    fn tiny_images_are_upscaled_to_jpeg() {
        let prepared = prepare_image(&png(100, 50)).unwrap();
        assert!(prepared.resized);
        assert_eq!(prepared.format, ImageFormat::Jpeg);
        assert_eq!((prepared.width, prepared.height), (300, 150));
        assert_eq!(image::guess_format(&prepared.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn huge_images_are_downscaled() {
        let prepared = prepare_image(&png(3000, 1000)).unwrap();
        assert_eq!((prepared.width, prepared.height), (2048, 683));
    }

    #[test]
    fn truncated_image_is_a_decode_error() {
        let bytes = png(50, 50);
        let err = prepare_image(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, BookLeakError::ImageDecode(_)));
    }

    #[test]
    fn rejects_unknown_and_unaccepted_formats() {
        assert!(matches!(
            validate_upload(b"not an image at all"),
            Err(BookLeakError::UnsupportedImage(_))
        ));
        assert!(matches!(validate_upload(b""), Err(BookLeakError::UnsupportedImage(_))));

        let img = ImageBuffer::from_pixel(4, 4, Rgb([0u8, 0, 0]));
        let mut bmp = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut bmp, ImageFormat::Bmp)
            .unwrap();
        assert!(matches!(
            validate_upload(&bmp.into_inner()),
            Err(BookLeakError::UnsupportedImage(_))
        ));
    }

    #[test]
    fn accepted_format_mime_types() {
        assert_eq!(content_type(ImageFormat::Jpeg), "image/jpeg");
        assert_eq!(content_type(ImageFormat::Png), "image/png");
    }
}
