//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::orientation::Orientation;

/// Dimensions of an image once its orientation has been applied.
pub fn oriented_dimensions(stored: (u32, u32), orientation: Orientation) -> (u32, u32) {
    if orientation.swaps_dimensions() {
        (stored.1, stored.0)
    } else {
        stored
    }
}

/// Tallest preview allowed, as a multiple of the target width.
pub const MAX_PREVIEW_ASPECT: u32 = 4;

/// Fit `source` inside a `target_width` by `target_width * MAX_PREVIEW_ASPECT`
/// box, keeping the aspect ratio.
///
/// Sources are never scaled up. Very tall sources are bounded by the box
/// height and come out narrower than the target. Neither side drops below
/// one pixel.
///
/// # Examples
/// ```
/// # use bucket_gal::imaging::calculate_preview_fit;
/// assert_eq!(calculate_preview_fit((4000, 3000), 200), (200, 150));
/// assert_eq!(calculate_preview_fit((1000, 3), 200), (200, 1));
/// assert_eq!(calculate_preview_fit((120, 90), 200), (120, 90));
/// assert_eq!(calculate_preview_fit((100, 9000), 200), (9, 800));
/// ```
pub fn calculate_preview_fit(source: (u32, u32), target_width: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let target_width = target_width.max(1);
    if src_w == 0 || src_h == 0 {
        return (target_width, 1);
    }
    let max_height = target_width.saturating_mul(MAX_PREVIEW_ASPECT);

    let width = target_width.min(src_w);
    let height = (width as f64 * src_h as f64 / src_w as f64).round() as u32;
    if height <= max_height {
        return (width, height.max(1));
    }
    let height = max_height.min(src_h);
    let width = (height as f64 * src_w as f64 / src_h as f64).round() as u32;
    (width.max(1), height)
}

/// Rendered height of an item laid out in a column of `column_width`.
pub fn scaled_height(dimensions: (u32, u32), column_width: f64) -> f64 {
    let (w, h) = dimensions;
    if w == 0 {
        return 0.0;
    }
    column_width * h as f64 / w as f64
}
