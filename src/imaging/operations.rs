//! High-level image operations.
//!
//! These functions combine calculations with backend execution. They take
//! source bytes or paths plus [`TransformOptions`] and return what the caller
//! needs to persist the result.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{calculate_preview_fit, oriented_dimensions};
use super::params::TransformOptions;
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// A derived image ready to be written, with the content type to store it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Get stored image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, bytes: &[u8]) -> Result<(u32, u32)> {
    let dims = backend.identify(bytes)?;
    Ok((dims.width, dims.height))
}

/// Dimensions the preview of `bytes` will have, without decoding pixels.
pub fn planned_dimensions(
    backend: &impl ImageBackend,
    bytes: &[u8],
    options: &TransformOptions,
) -> Result<(u32, u32)> {
    let Dimensions { width, height } = backend.identify(bytes)?;
    let displayed = if options.strip_orientation {
        oriented_dimensions((width, height), backend.orientation(bytes))
    } else {
        (width, height)
    };
    Ok(calculate_preview_fit(displayed, options.target_width))
}

/// Transform original bytes into a preview.
pub fn create_preview<B: ImageBackend + ?Sized>(
    backend: &B,
    bytes: &[u8],
    options: &TransformOptions,
) -> Result<Preview> {
    let encoded = backend.transform(bytes, options)?;
    Ok(Preview {
        bytes: encoded.bytes,
        content_type: options.output_format.content_type(),
        width: encoded.dimensions.width,
        height: encoded.dimensions.height,
    })
}

/// Convert one file on disk, creating the output's parent directory.
pub fn convert_file<B: ImageBackend + ?Sized>(
    backend: &B,
    source: &Path,
    output: &Path,
    options: &TransformOptions,
) -> Result<Preview> {
    let bytes = std::fs::read(source)?;
    let preview = create_preview(backend, &bytes, options)?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, &preview.bytes)?;
    Ok(preview)
}
