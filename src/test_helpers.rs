//! Shared test utilities for the bucket-gal test suite.
//!
//! Provides in-process image fixtures (synthetic JPEGs, a hand-assembled EXIF
//! APP1 segment) and pre-seeded memory stores.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let bytes = jpeg_with_exif(&solid_jpeg(40, 20), &ExifFixture {
//!     orientation: Some(6),
//!     exposure_time: Some((1, 250)),
//!     ..ExifFixture::default()
//! });
//! let store = gallery_store();
//! ```

use crate::store::MemoryStore;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use std::sync::Arc;

// =========================================================================
// Synthetic JPEGs
// =========================================================================

fn encode_jpeg(img: &RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 95)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// A gradient JPEG of the given size.
pub fn solid_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    encode_jpeg(&img)
}

/// Left half pure red, right half pure blue.
pub fn halves_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    });
    encode_jpeg(&img)
}

// =========================================================================
// EXIF APP1 segment
// =========================================================================

/// Fields to embed. Rationals are `(numerator, denominator)`.
#[derive(Debug, Clone, Default)]
pub struct ExifFixture {
    pub orientation: Option<u16>,
    pub make: Option<&'static str>,
    pub model: Option<&'static str>,
    pub lens: Option<&'static str>,
    pub exposure_time: Option<(u32, u32)>,
    pub f_number: Option<(u32, u32)>,
    pub iso: Option<u16>,
    pub focal_length: Option<(u32, u32)>,
    /// `YYYY:MM:DD HH:MM:SS`
    pub date_time: Option<&'static str>,
    pub gps: Option<GpsFixture>,
}

#[derive(Debug, Clone)]
pub struct GpsFixture {
    pub latitude: [(u32, u32); 3],
    pub latitude_ref: &'static str,
    pub longitude: [(u32, u32); 3],
    pub longitude_ref: &'static str,
}

const ASCII: u16 = 2;
const SHORT: u16 = 3;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

fn ascii(tag: u16, s: &str) -> Entry {
    let mut data = s.as_bytes().to_vec();
    data.push(0);
    Entry {
        tag,
        kind: ASCII,
        count: data.len() as u32,
        data,
    }
}

fn short(tag: u16, v: u16) -> Entry {
    Entry {
        tag,
        kind: SHORT,
        count: 1,
        data: v.to_le_bytes().to_vec(),
    }
}

fn long(tag: u16, v: u32) -> Entry {
    Entry {
        tag,
        kind: LONG,
        count: 1,
        data: v.to_le_bytes().to_vec(),
    }
}

fn rationals(tag: u16, values: &[(u32, u32)]) -> Entry {
    let mut data = Vec::new();
    for (n, d) in values {
        data.extend_from_slice(&n.to_le_bytes());
        data.extend_from_slice(&d.to_le_bytes());
    }
    Entry {
        tag,
        kind: RATIONAL,
        count: values.len() as u32,
        data,
    }
}

/// Serialise one IFD placed at `offset` within the TIFF block.
fn build_ifd(entries: &[Entry], offset: u32) -> Vec<u8> {
    let header_len = 2 + 12 * entries.len() as u32 + 4;
    let mut ifd = Vec::new();
    let mut data_area = Vec::new();

    ifd.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in entries {
        ifd.extend_from_slice(&entry.tag.to_le_bytes());
        ifd.extend_from_slice(&entry.kind.to_le_bytes());
        ifd.extend_from_slice(&entry.count.to_le_bytes());
        if entry.data.len() <= 4 {
            let mut inline = entry.data.clone();
            inline.resize(4, 0);
            ifd.extend_from_slice(&inline);
        } else {
            let at = offset + header_len + data_area.len() as u32;
            ifd.extend_from_slice(&at.to_le_bytes());
            data_area.extend_from_slice(&entry.data);
            if data_area.len() % 2 == 1 {
                data_area.push(0);
            }
        }
    }
    ifd.extend_from_slice(&0u32.to_le_bytes());
    ifd.extend_from_slice(&data_area);
    ifd
}

/// Little-endian TIFF block with IFD0, an Exif IFD, and a GPS IFD as needed.
pub fn exif_tiff(fixture: &ExifFixture) -> Vec<u8> {
    let mut exif_entries = Vec::new();
    if let Some(v) = fixture.exposure_time {
        exif_entries.push(rationals(0x829A, &[v]));
    }
    if let Some(v) = fixture.f_number {
        exif_entries.push(rationals(0x829D, &[v]));
    }
    if let Some(v) = fixture.iso {
        exif_entries.push(short(0x8827, v));
    }
    if let Some(v) = fixture.date_time {
        exif_entries.push(ascii(0x9003, v));
    }
    if let Some(v) = fixture.focal_length {
        exif_entries.push(rationals(0x920A, &[v]));
    }
    if let Some(v) = fixture.lens {
        exif_entries.push(ascii(0xA434, v));
    }

    let gps_entries: Vec<Entry> = fixture
        .gps
        .as_ref()
        .map(|gps| {
            vec![
                ascii(0x0001, gps.latitude_ref),
                rationals(0x0002, &gps.latitude),
                ascii(0x0003, gps.longitude_ref),
                rationals(0x0004, &gps.longitude),
            ]
        })
        .unwrap_or_default();

    let ifd0_entries = |exif_at: u32, gps_at: u32| {
        let mut entries = Vec::new();
        if let Some(v) = fixture.make {
            entries.push(ascii(0x010F, v));
        }
        if let Some(v) = fixture.model {
            entries.push(ascii(0x0110, v));
        }
        if let Some(v) = fixture.orientation {
            entries.push(short(0x0112, v));
        }
        if !exif_entries.is_empty() {
            entries.push(long(0x8769, exif_at));
        }
        if !gps_entries.is_empty() {
            entries.push(long(0x8825, gps_at));
        }
        entries
    };

    // Pointer values are inline, so the IFD0 length doesn't depend on them.
    let ifd0_len = build_ifd(&ifd0_entries(0, 0), 8).len() as u32;
    let exif_at = 8 + ifd0_len;
    let exif_ifd = build_ifd(&exif_entries, exif_at);
    let gps_at = exif_at + if exif_entries.is_empty() { 0 } else { exif_ifd.len() as u32 };
    let gps_ifd = build_ifd(&gps_entries, gps_at);

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());
    tiff.extend_from_slice(&build_ifd(&ifd0_entries(exif_at, gps_at), 8));
    if !exif_entries.is_empty() {
        tiff.extend_from_slice(&exif_ifd);
    }
    if !gps_entries.is_empty() {
        tiff.extend_from_slice(&gps_ifd);
    }
    tiff
}

/// Insert an EXIF APP1 segment right after the SOI marker of `jpeg`.
pub fn jpeg_with_exif(jpeg: &[u8], fixture: &ExifFixture) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG");
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&exif_tiff(fixture));

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// A JPEG carrying the fields of a typical camera shot.
pub fn camera_jpeg() -> Vec<u8> {
    jpeg_with_exif(
        &solid_jpeg(64, 48),
        &ExifFixture {
            orientation: Some(1),
            make: Some("FUJIFILM"),
            model: Some("X-T4"),
            lens: Some("XF23mmF2 R WR"),
            exposure_time: Some((1, 250)),
            f_number: Some((28, 10)),
            iso: Some(400),
            focal_length: Some((23, 1)),
            date_time: Some("2024:05:17 18:42:03"),
            gps: Some(GpsFixture {
                latitude: [(48, 1), (51, 1), (2940, 100)],
                latitude_ref: "N",
                longitude: [(2, 1), (17, 1), (4020, 100)],
                longitude_ref: "E",
            }),
        },
    )
}

// =========================================================================
// Seeded stores
// =========================================================================

/// Store with `gallery/cats` (2 images), `gallery/dogs` (3 images), plus
/// objects the index must ignore.
pub fn gallery_store() -> Arc<MemoryStore> {
    let store = MemoryStore::with_page_size(3);
    for key in [
        "gallery/cats/a.jpg",
        "gallery/cats/b.jpg",
        "gallery/dogs/c.jpg",
        "gallery/dogs/d.jpg",
        "gallery/dogs/e.jpg",
    ] {
        store.insert(key, solid_jpeg(40, 30), "image/jpeg");
    }
    store.insert("gallery/0_preview/dogs/c.webp", b"old preview".to_vec(), "image/webp");
    store.insert("gallery/cats/.DS_Store", b"junk".to_vec(), "application/octet-stream");
    store.insert("gallery/dogs/", Vec::new(), "application/x-directory");
    store.insert("gallery/dogs/notes.txt", b"hi".to_vec(), "text/plain");
    store.insert("gallery/readme.jpg", solid_jpeg(8, 8), "image/jpeg");
    Arc::new(store)
}
