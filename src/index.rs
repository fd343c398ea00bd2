//! Store scanning and manifest generation.
//!
//! Lists every object under the collection root and turns the listing into a
//! [`GalleryManifest`].
//!
//! ## Bucket layout
//!
//! ```text
//! gallery/                         # collection root
//! ├── cats/                        # category (first segment below the root)
//! │   ├── 001-tabby.jpg
//! │   └── a.jpg
//! ├── travel/japan/tokyo.jpg       # deeper keys belong to their first segment
//! ├── loose.jpg                    # root-level file: skipped
//! └── 0_preview/...                # derived previews: skipped
//! ```
//!
//! ## Rules
//!
//! - Previews, directory markers (`.../`), hidden files (`.DS_Store`), and
//!   files with unsupported extensions are skipped.
//! - Categories appear in the order the listing first reaches them.
//! - Images are sorted by file name within a category.
//! - Pagination is handled by [`ObjectStore::list_all`](crate::store::ObjectStore::list_all).
//!
//! Building twice over an unchanged store yields the same categories and
//! images; only `generated_at` differs.

use crate::keys::{ImageKey, KeyScheme, UrlBuilder, display_name, parse_entry_name};
use crate::manifest::{CategoryEntry, GalleryManifest, ImageDescriptor, ManifestError};
use crate::metadata::MetadataExtractor;
use crate::store::{SharedStore, StoreError};
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use thiserror::Error;

pub const TRACING_TARGET: &str = "bucket_gal::index";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

/// Why a listed key was left out of the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Preview,
    DirectoryMarker,
    Hidden,
    Unsupported,
    RootLevel,
}

/// Classify one listed key. `Ok(category)` for images that belong in the manifest.
pub fn classify<'a>(scheme: &KeyScheme, key: &'a ImageKey) -> Result<&'a str, Skip> {
    let raw = key.as_str();
    if scheme.is_preview(raw) {
        return Err(Skip::Preview);
    }
    if raw.ends_with('/') {
        return Err(Skip::DirectoryMarker);
    }
    if key.file_name().starts_with('.') {
        return Err(Skip::Hidden);
    }
    if !key.is_supported_image() {
        return Err(Skip::Unsupported);
    }
    scheme.category_of(key).ok_or(Skip::RootLevel)
}

fn category_title(id: &str) -> String {
    let parsed = parse_entry_name(id);
    if parsed.display_title.is_empty() {
        id.to_string()
    } else {
        parsed.display_title
    }
}

#[derive(Clone)]
pub struct IndexBuilder {
    store: SharedStore,
    scheme: KeyScheme,
    urls: UrlBuilder,
    exif: Option<MetadataExtractor>,
    concurrency: usize,
}

impl IndexBuilder {
    pub fn new(store: SharedStore, scheme: KeyScheme, urls: UrlBuilder) -> Self {
        Self {
            store,
            scheme,
            urls,
            exif: None,
            concurrency: 8,
        }
    }

    /// Embed an EXIF summary in each JPEG descriptor, `concurrency` fetches at a time.
    pub fn with_exif(mut self, extractor: MetadataExtractor, concurrency: usize) -> Self {
        self.exif = Some(extractor);
        self.concurrency = concurrency.max(1);
        self
    }

    /// Pure core: turn listed keys into a manifest.
    pub fn build_from_keys<I, S>(&self, keys: I) -> GalleryManifest
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut order: Vec<(String, Vec<ImageDescriptor>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut skipped = 0usize;

        for raw in keys {
            let key = ImageKey::new(raw.as_ref());
            let category = match classify(&self.scheme, &key) {
                Ok(category) => category.to_string(),
                Err(reason) => {
                    tracing::trace!(target: TRACING_TARGET, key = %key, ?reason, "skipped");
                    skipped += 1;
                    continue;
                }
            };

            let descriptor = ImageDescriptor {
                name: display_name(&key),
                filename: key.file_name().to_string(),
                extension: key.extension().unwrap_or_default(),
                original: self.urls.object_url(key.as_str()),
                preview: self.urls.thumbnail_route(&key),
                category: category.clone(),
                exif: None,
                key,
            };

            let slot = *positions.entry(category.clone()).or_insert_with(|| {
                order.push((category, Vec::new()));
                order.len() - 1
            });
            order[slot].1.push(descriptor);
        }

        let mut total_images = 0;
        let gallery = order
            .into_iter()
            .map(|(id, mut images)| {
                images.sort_by(|a, b| a.filename.cmp(&b.filename));
                total_images += images.len();
                let entry = CategoryEntry {
                    name: category_title(&id),
                    count: images.len(),
                    images,
                };
                (id, entry)
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            target: TRACING_TARGET,
            categories = gallery.len(),
            images = total_images,
            skipped,
            "manifest assembled"
        );

        GalleryManifest {
            gallery,
            total_images,
            generated_at: Utc::now(),
        }
    }

    /// List the store and build the manifest.
    pub async fn build(&self) -> Result<GalleryManifest, IndexError> {
        let prefix = self.scheme.listing_prefix();
        let objects = self.store.list_all(&prefix).await?;
        tracing::info!(
            target: TRACING_TARGET,
            store = %self.store.describe(),
            prefix = %prefix,
            objects = objects.len(),
            "listed store"
        );

        let mut manifest = self.build_from_keys(objects.iter().map(|o| o.key.as_str()));
        if let Some(extractor) = &self.exif {
            self.enrich(&mut manifest, extractor).await;
        }
        Ok(manifest)
    }

    async fn enrich(&self, manifest: &mut GalleryManifest, extractor: &MetadataExtractor) {
        let targets: Vec<(usize, usize, ImageKey)> = manifest
            .gallery
            .iter()
            .enumerate()
            .flat_map(|(c, (_, entry))| {
                entry
                    .images
                    .iter()
                    .enumerate()
                    .filter(|(_, img)| img.key.is_jpeg())
                    .map(move |(i, img)| (c, i, img.key.clone()))
            })
            .collect();

        let summaries: Vec<_> = futures::stream::iter(targets)
            .map(|(c, i, key)| async move { (c, i, extractor.summary(&key).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut found = 0usize;
        for (c, i, summary) in summaries {
            if summary.is_some() {
                found += 1;
            }
            manifest.gallery[c].1.images[i].exif = summary;
        }
        tracing::info!(target: TRACING_TARGET, with_exif = found, "EXIF enrichment done");
    }

    /// Store the manifest next to the collection as `<root>/<file_name>`.
    pub async fn publish(
        &self,
        manifest: &GalleryManifest,
        file_name: &str,
    ) -> Result<String, IndexError> {
        let key = format!("{}{}", self.scheme.listing_prefix(), file_name);
        let body = manifest.to_json()?;
        self.store
            .put(&key, Bytes::from(body), "application/json")
            .await?;
        tracing::info!(target: TRACING_TARGET, key = %key, "manifest published");
        Ok(key)
    }
}
