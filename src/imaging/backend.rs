//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend must
//! support: identify, orientation, and transform. All of them work on
//! in-memory bytes because originals arrive from the object store, not disk.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), with everything
//! statically linked into the binary.

use super::orientation::Orientation;
use super::params::TransformOptions;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Encoded output of a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
}

/// Trait for image processing backends.
///
/// `Send + Sync` so one backend can be shared by rayon workers and by the
/// blocking pool behind the HTTP server.
pub trait ImageBackend: Send + Sync {
    /// Stored pixel dimensions (before orientation).
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError>;

    /// Embedded EXIF orientation. Images without one are `Normal`.
    fn orientation(&self, bytes: &[u8]) -> Orientation;

    /// Decode, orient, resize, and re-encode.
    fn transform(
        &self,
        bytes: &[u8],
        options: &TransformOptions,
    ) -> Result<EncodedImage, BackendError>;
}
