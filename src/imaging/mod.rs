//! Image transform engine.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Orientation** | `kamadak-exif`, physical rotate/flip |
//! | **Resize** | Lanczos3 into a target-width box, never upscaling |
//! | **Encode** | JPEG or lossy WebP (`webp`) at a quality |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: [`TransformOptions`] and friends
//! - **Orientation**: EXIF orientation values as pixel operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod orientation;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, EncodedImage, ImageBackend};
pub use calculations::{
    MAX_PREVIEW_ASPECT, calculate_preview_fit, oriented_dimensions, scaled_height,
};
pub use operations::{Preview, convert_file, create_preview, get_dimensions, planned_dimensions};
pub use orientation::Orientation;
pub use params::{OutputFormat, Quality, TransformOptions};
pub use rust_backend::RustBackend;
