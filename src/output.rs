//! CLI output formatting.
//!
//! Output is information-first: every entity leads with its positional index
//! and display name, with storage keys shown as indented context lines.
//!
//! ## Index
//!
//! ```text
//! Categories
//! 001 Cats (2 photos)
//!     Prefix: gallery/cats/
//!     001 a (a.jpg)
//!     002 Sleepy cat (010-sleepy_cat.jpg)
//!
//! Indexed 2 images in 1 category
//! ```
//!
//! ## Convert
//!
//! ```text
//! Converting 3 images
//! 001 a.jpg → out/cats/a.webp (400x300)
//! 002 b.jpg: skipped
//! ```
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::convert::{ConvertEvent, FileStatus};
use crate::manifest::GalleryManifest;
use crate::store::ObjectMeta;
use crate::thumbnail::WarmReport;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

/// Titled images show name and filename; when they match only the filename.
fn image_line(index: usize, name: &str, filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    if name.is_empty() || name == stem {
        format!("{} {}", format_index(index), filename)
    } else {
        format!("{} {} ({})", format_index(index), name, filename)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Index
// ============================================================================

pub fn format_index_output(manifest: &GalleryManifest, prefix: &str) -> Vec<String> {
    let mut lines = vec!["Categories".to_string()];
    for (pos, (id, entry)) in manifest.gallery.iter().enumerate() {
        lines.push(format!(
            "{} {} ({})",
            format_index(pos + 1),
            entry.name,
            plural(entry.count, "photo", "photos")
        ));
        lines.push(format!("{}Prefix: {}{}/", indent(1), prefix, id));
        for (i, image) in entry.images.iter().enumerate() {
            lines.push(format!(
                "{}{}",
                indent(1),
                image_line(i + 1, &image.name, &image.filename)
            ));
            if let Some(exif) = image.exif.as_ref().filter(|e| !e.is_empty()) {
                let parts: Vec<&str> = [
                    exif.camera.as_deref(),
                    exif.aperture.as_deref(),
                    exif.shutter_speed.as_deref(),
                ]
                .into_iter()
                .flatten()
                .collect();
                if !parts.is_empty() {
                    lines.push(format!("{}Exif: {}", indent(2), parts.join(", ")));
                }
            }
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "Indexed {} in {}",
        plural(manifest.total_images, "image", "images"),
        plural(manifest.gallery.len(), "category", "categories")
    ));
    lines
}

pub fn print_index_output(manifest: &GalleryManifest, prefix: &str) {
    for line in format_index_output(manifest, prefix) {
        println!("{}", line);
    }
}

pub fn format_warm_report(report: &WarmReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Previews: {} cached, {} generated, {} failed",
        report.hits,
        report.generated,
        report.failed.len()
    )];
    for (key, err) in &report.failed {
        lines.push(format!("{}{}: {}", indent(1), key, err));
    }
    lines
}

pub fn print_warm_report(report: &WarmReport) {
    for line in format_warm_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Convert
// ============================================================================

/// Format a single convert progress event as display lines.
pub fn format_convert_event(event: &ConvertEvent) -> Vec<String> {
    match event {
        ConvertEvent::Started { total } => {
            vec![format!("Converting {}", plural(*total, "image", "images"))]
        }
        ConvertEvent::FileDone {
            index,
            source,
            output,
            status,
        } => {
            let name = file_name(source);
            match status {
                FileStatus::Converted { width, height } => vec![format!(
                    "{} {} → {} ({}x{})",
                    format_index(*index),
                    name,
                    output.display(),
                    width,
                    height
                )],
                FileStatus::Skipped => {
                    vec![format!("{} {}: skipped", format_index(*index), name)]
                }
                FileStatus::Failed(message) => vec![
                    format!("{} {}: FAILED", format_index(*index), name),
                    format!("{}{}", indent(1), message),
                ],
            }
        }
    }
}

// ============================================================================
// List
// ============================================================================

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

pub fn format_listing(objects: &[ObjectMeta]) -> Vec<String> {
    let mut lines: Vec<String> = objects
        .iter()
        .map(|obj| format!("{:>10}  {}", human_size(obj.size), obj.key))
        .collect();
    let total: u64 = objects.iter().map(|o| o.size).sum();
    lines.push(format!(
        "{}, {}",
        plural(objects.len(), "object", "objects"),
        human_size(total)
    ));
    lines
}

pub fn print_listing(objects: &[ObjectMeta]) {
    for line in format_listing(objects) {
        println!("{}", line);
    }
}

pub fn format_buckets(buckets: &[String]) -> Vec<String> {
    let mut lines = vec!["Buckets".to_string()];
    lines.extend(
        buckets
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{} {}", format_index(i + 1), name)),
    );
    lines
}

pub fn print_buckets(buckets: &[String]) {
    for line in format_buckets(buckets) {
        println!("{}", line);
    }
}
