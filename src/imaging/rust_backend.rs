//! Statically linked image processing backend.
//!
//! Everything is statically linked into the binary; libwebp is built from
//! source by `libwebp-sys`.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory` |
//! | Identify | `ImageReader::with_guessed_format` + `into_dimensions` (header only) |
//! | Orientation | `kamadak-exif` container reader, tag 0x0112 |
//! | Resize | `calculate_preview_fit` box, then `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` at the requested quality |
//! | Encode → WebP | `webp::Encoder` (libwebp, lossy) at the requested quality |
//!
//! Neither encoder writes EXIF, so output never carries an orientation tag.

use super::backend::{BackendError, Dimensions, EncodedImage, ImageBackend};
use super::calculations::calculate_preview_fit;
use super::orientation::Orientation;
use super::params::{OutputFormat, TransformOptions};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader};
use std::io::Cursor;

/// Backend built on the `image` crate ecosystem plus libwebp.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    image::load_from_memory(bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Read the orientation tag. Missing or unreadable EXIF means `Normal`.
pub(crate) fn read_orientation(bytes: &[u8]) -> Orientation {
    let mut cursor = Cursor::new(bytes);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return Orientation::Normal;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(Orientation::from_exif)
        .unwrap_or_default()
}

fn encode(img: &DynamicImage, options: &TransformOptions) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    match options.output_format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, options.quality.value() as u8);
            rgb.write_with_encoder(encoder)
                .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {e}")))?;
        }
        OutputFormat::Webp => {
            let quality = options.quality.value() as f32;
            let encoded = if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
                encoder.encode_simple(false, quality)
            } else {
                let rgb = img.to_rgb8();
                let encoder = webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height());
                encoder.encode_simple(false, quality)
            };
            let encoded =
                encoded.map_err(|e| BackendError::Encode(format!("WebP encode failed: {e:?}")))?;
            buf.extend_from_slice(&encoded);
        }
    }
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| BackendError::Decode(format!("Failed to read dimensions: {e}")))?;
        Ok(Dimensions { width, height })
    }

    fn orientation(&self, bytes: &[u8]) -> Orientation {
        read_orientation(bytes)
    }

    fn transform(
        &self,
        bytes: &[u8],
        options: &TransformOptions,
    ) -> Result<EncodedImage, BackendError> {
        let img = decode(bytes)?;
        let img = if options.strip_orientation {
            read_orientation(bytes).apply(img)
        } else {
            img
        };

        let (width, height) = calculate_preview_fit(img.dimensions(), options.target_width);
        let resized = img.resize_exact(width, height, FilterType::Lanczos3);

        Ok(EncodedImage {
            bytes: encode(&resized, options)?,
            dimensions: Dimensions { width, height },
        })
    }
}
