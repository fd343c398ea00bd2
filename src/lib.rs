//! # Bucket Gal
//!
//! A photo gallery served straight from an S3-compatible bucket. Folders
//! under a prefix become categories, images inside them become photos, and
//! small previews are generated the first time a browser asks for them.
//!
//! # Request flow
//!
//! ```text
//!  GET /images ──────► index::IndexBuilder ── list ──► store ──► manifest JSON
//!  GET /thumbnail/k ─► thumbnail::ThumbnailCache ─ head ─► hit ─────► 302
//!                                                  └─ miss ─ get ─► imaging ─ put ─► 302
//!  GET /exif/k ──────► metadata::MetadataExtractor ─ get ─► kamadak-exif ─► JSON
//! ```
//!
//! The browser side (paging, masonry layout, the detail view) is modelled in
//! [`client`] so it can be exercised against a live server from Rust.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`keys`] | Object keys, derived preview keys, public URLs, `NNN-name` titles |
//! | [`store`] | `ObjectStore` trait: S3 through the AWS SDK, in-memory for tests |
//! | [`imaging`] | Decode, orientation, bounded resize, JPEG/WebP encode |
//! | [`metadata`] | EXIF reading and display formatting |
//! | [`thumbnail`] | Lazy preview generation with a store-backed cache |
//! | [`manifest`] | The gallery manifest served by `/images` |
//! | [`index`] | Builds a manifest from a bucket listing |
//! | [`config`] | `gallery.toml` loading, environment overrides, validation |
//! | [`convert`] | One-shot local directory conversion on a rayon pool |
//! | [`server`] | axum routes, the gallery page, push notifications |
//! | [`client`] | Browser behaviour: batches, layout, detail view, HTTP client |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The bucket is the database
//!
//! There is no catalogue to keep in sync. A listing is the source of truth,
//! previews live beside the originals under a reserved folder, and whether a
//! preview exists is answered by a `head` request. Deleting the preview
//! folder is always safe: everything in it is regenerated on demand.
//!
//! ## Previews are write-once
//!
//! Originals are assumed never to change under the same key, so previews are
//! never compared against their source. Two requests racing on the same
//! missing preview may both generate it; the second write is identical.
//!
//! ## Self-contained imaging
//!
//! Decoding and resizing use the `image` crate; lossy WebP goes through
//! libwebp, compiled and linked statically by the `webp` crate. No system
//! libraries are needed at runtime, so the binary runs anywhere the bucket
//! is reachable.

pub mod client;
pub mod config;
pub mod convert;
pub mod imaging;
pub mod index;
pub mod keys;
pub mod manifest;
pub mod metadata;
pub mod output;
pub mod server;
pub mod store;
pub mod thumbnail;

#[cfg(test)]
pub(crate) mod test_helpers;
