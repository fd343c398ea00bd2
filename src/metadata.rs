//! Capture metadata (EXIF) extraction.
//!
//! Metadata is a display nicety: nothing in the gallery needs it to render.
//! Every step is therefore best-effort.
//!
//! ## What is read
//!
//! Only JPEG originals are parsed. Other formats short-circuit to an empty
//! result without fetching a byte. From a JPEG we take:
//!
//! | Output | EXIF tag |
//! |---|---|
//! | aperture | `FNumber` (0x829D) |
//! | shutterSpeed | `ExposureTime` (0x829A) |
//! | iso | `PhotographicSensitivity` (0x8827) |
//! | focalLength | `FocalLength` (0x920A) |
//! | camera | `Make` + `Model` |
//! | lens | `LensModel` (0xA434) |
//! | gps | `GPSLatitude`/`GPSLongitude` with their refs |
//! | dateTime | `DateTimeOriginal` (0x9003) |
//!
//! ## Two shapes
//!
//! - [`ExifReading`]: raw numbers for the `/exif` route: `FNumber` rounded
//!   to one decimal, `ExposureTime` to four, `ISO` as an integer.
//! - [`ExifSummary`]: display strings (`f/2.8`, `1/250s`, `50mm`) embedded
//!   in the manifest.
//!
//! ## Failure handling
//!
//! Parse failures are logged at debug level and produce an empty result.
//! [`MetadataExtractor`] bounds the fetch of the original in time; a timeout
//! also produces an empty result. Only a missing original or an unreachable
//! store reach the caller as errors.

use crate::keys::ImageKey;
use crate::store::{SharedStore, StoreError, with_timeout};
use chrono::NaiveDateTime;
use exif::{In, Tag, Value};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;

pub const TRACING_TARGET: &str = "bucket_gal::metadata";

/// Display-ready capture metadata. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutter_speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
}

impl ExifSummary {
    pub fn is_empty(&self) -> bool {
        *self == ExifSummary::default()
    }
}

/// Signed decimal degrees, rounded to six places.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Raw exposure numbers. Absent values serialise as `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifReading {
    #[serde(rename = "FNumber")]
    pub f_number: Option<f64>,
    #[serde(rename = "ExposureTime")]
    pub exposure_time: Option<f64>,
    #[serde(rename = "ISO")]
    pub iso: Option<u32>,
}

/// Body of the `/exif` route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifReport {
    #[serde(flatten)]
    pub reading: ExifReading,
    #[serde(default)]
    pub summary: ExifSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExifReport {
    /// Empty reading carrying an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Everything read from one EXIF block, before formatting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureData {
    pub f_number: Option<f64>,
    pub exposure_time: Option<f64>,
    pub iso: Option<u32>,
    pub focal_length: Option<f64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub date_time: Option<NaiveDateTime>,
}

impl CaptureData {
    pub fn reading(&self) -> ExifReading {
        ExifReading {
            f_number: self.f_number.map(|v| round_to(v, 1)),
            exposure_time: self.exposure_time.map(|v| round_to(v, 4)),
            iso: self.iso,
        }
    }

    pub fn summary(&self) -> ExifSummary {
        ExifSummary {
            aperture: self.f_number.and_then(format_aperture),
            shutter_speed: self.exposure_time.and_then(format_shutter),
            iso: self.iso,
            focal_length: self.focal_length.and_then(format_focal_length),
            camera: camera_name(self.make.as_deref(), self.model.as_deref()),
            lens: self.lens.clone(),
            gps: match (self.latitude, self.longitude) {
                (Some(lat), Some(lon)) => Some(GpsPosition {
                    latitude: round_to(lat, 6),
                    longitude: round_to(lon, 6),
                }),
                _ => None,
            },
            date_time: self
                .date_time
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }

    pub fn report(&self) -> ExifReport {
        ExifReport {
            reading: self.reading(),
            summary: self.summary(),
            error: None,
        }
    }
}

// ============================================================================
// Formatting
// ============================================================================

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Fixed-precision decimal with trailing zeros removed: `2.80` → `2.8`, `8.0` → `8`.
fn trim_decimal(value: f64, places: usize) -> String {
    let s = format!("{value:.places$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Exposure in seconds as a display string.
///
/// Below one second the reciprocal is shown: `0.004` → `1/250s`.
/// Longer exposures keep one decimal: `2.5` → `2.5s`, `30` → `30s`.
pub fn format_shutter(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    if seconds < 1.0 {
        let denominator = (1.0 / seconds).round() as u64;
        Some(format!("1/{denominator}s"))
    } else {
        Some(format!("{}s", trim_decimal(seconds, 1)))
    }
}

/// `2.8` → `f/2.8`.
pub fn format_aperture(f_number: f64) -> Option<String> {
    if !f_number.is_finite() || f_number <= 0.0 {
        return None;
    }
    Some(format!("f/{}", trim_decimal(f_number, 1)))
}

/// `50.0` → `50mm`.
pub fn format_focal_length(mm: f64) -> Option<String> {
    if !mm.is_finite() || mm <= 0.0 {
        return None;
    }
    Some(format!("{}mm", trim_decimal(mm, 1)))
}

/// `Make Model`, without repeating the make when the model already has it.
fn camera_name(make: Option<&str>, model: Option<&str>) -> Option<String> {
    match (make, model) {
        (Some(make), Some(model)) if model.starts_with(make) => Some(model.to_string()),
        (Some(make), Some(model)) => Some(format!("{make} {model}")),
        (Some(only), None) | (None, Some(only)) => Some(only.to_string()),
        (None, None) => None,
    }
}

/// Degrees/minutes/seconds to signed decimal degrees.
pub fn dms_to_decimal(dms: [f64; 3], reference: &str) -> f64 {
    let value = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    if matches!(reference, "S" | "W") {
        -value
    } else {
        value
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn ascii_field(exif: &exif::Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => {
            let raw = parts.first()?;
            let text = String::from_utf8_lossy(raw)
                .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string();
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

fn rationals(exif: &exif::Exif, tag: Tag) -> Option<Vec<f64>> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(values) => {
            let out: Vec<f64> = values
                .iter()
                .filter(|r| r.denom != 0)
                .map(|r| r.to_f64())
                .collect();
            (!out.is_empty()).then_some(out)
        }
        _ => None,
    }
}

fn rational(exif: &exif::Exif, tag: Tag) -> Option<f64> {
    rationals(exif, tag)?.first().copied()
}

fn coordinate(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let parts = rationals(exif, value_tag)?;
    if parts.len() < 3 {
        return None;
    }
    let reference = ascii_field(exif, ref_tag).unwrap_or_default();
    Some(dms_to_decimal([parts[0], parts[1], parts[2]], &reference))
}

fn capture_from_exif(exif: &exif::Exif) -> CaptureData {
    CaptureData {
        f_number: rational(exif, Tag::FNumber),
        exposure_time: rational(exif, Tag::ExposureTime),
        iso: exif
            .get_field(Tag::PhotographicSensitivity, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0)),
        focal_length: rational(exif, Tag::FocalLength),
        make: ascii_field(exif, Tag::Make),
        model: ascii_field(exif, Tag::Model),
        lens: ascii_field(exif, Tag::LensModel),
        latitude: coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef),
        longitude: coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef),
        date_time: ascii_field(exif, Tag::DateTimeOriginal)
            .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y:%m:%d %H:%M:%S").ok()),
    }
}

/// Whether files with this extension are worth parsing.
pub fn carries_exif(extension: &str) -> bool {
    matches!(extension.to_ascii_lowercase().as_str(), "jpg" | "jpeg")
}

/// Parse capture data from original bytes. `None` for non-JPEG input or
/// when no EXIF block can be read.
pub fn read_capture(bytes: &[u8], extension: &str) -> Option<CaptureData> {
    if !carries_exif(extension) {
        return None;
    }
    let mut cursor = Cursor::new(bytes);
    match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => Some(capture_from_exif(&exif)),
        Err(err) => {
            tracing::debug!(target: TRACING_TARGET, error = %err, "no readable EXIF");
            None
        }
    }
}

/// Display summary for original bytes; empty on any failure.
pub fn extract_summary(bytes: &[u8], extension: &str) -> ExifSummary {
    read_capture(bytes, extension)
        .map(|c| c.summary())
        .unwrap_or_default()
}

// ============================================================================
// Store-backed extraction
// ============================================================================

/// Fetches originals from the store and extracts metadata within a time budget.
#[derive(Clone)]
pub struct MetadataExtractor {
    store: SharedStore,
    timeout: Duration,
}

impl MetadataExtractor {
    pub fn new(store: SharedStore, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Report for `key`.
    ///
    /// `StoreError::NotFound` and `StoreError::Unavailable` propagate. A
    /// timeout, a non-JPEG key, or unreadable EXIF yield an empty report.
    pub async fn extract(&self, key: &ImageKey) -> Result<ExifReport, StoreError> {
        let extension = key.extension().unwrap_or_default();
        if !carries_exif(&extension) {
            return Ok(ExifReport::default());
        }

        let bytes = match with_timeout(self.timeout, self.store.get(key.as_str())).await {
            Ok(bytes) => bytes,
            Err(StoreError::Timeout(limit)) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    key = %key,
                    timeout_ms = limit.as_millis() as u64,
                    "EXIF fetch timed out, returning empty summary"
                );
                return Ok(ExifReport::default());
            }
            Err(err) => return Err(err),
        };

        let report = tokio::task::spawn_blocking(move || {
            read_capture(&bytes, &extension)
                .map(|c| c.report())
                .unwrap_or_default()
        })
        .await
        .unwrap_or_else(|err| ExifReport::failed(format!("EXIF worker failed: {err}")));
        Ok(report)
    }

    /// Summary only, swallowing every error. Used while enriching the index.
    pub async fn summary(&self, key: &ImageKey) -> Option<ExifSummary> {
        match self.extract(key).await {
            Ok(report) if !report.summary.is_empty() => Some(report.summary),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(target: TRACING_TARGET, key = %key, error = %err, "EXIF skipped");
                None
            }
        }
    }
}
