//! The manifest served by `GET /images`, built once and kept in memory.

use super::TRACING_TARGET;
use crate::index::{IndexBuilder, IndexError};
use crate::manifest::{GalleryManifest, ManifestError};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where the manifest comes from.
#[derive(Clone)]
pub enum ManifestOrigin {
    /// List the store through the index builder.
    Store(IndexBuilder),
    /// Read a `gallery-index.json` written by `bucket-gal index`.
    File(PathBuf),
}

/// A manifest with its serialised body and entity tag.
#[derive(Debug)]
pub struct Snapshot {
    pub manifest: GalleryManifest,
    pub body: Bytes,
    pub etag: String,
}

impl Snapshot {
    pub fn new(manifest: GalleryManifest) -> Result<Self, ManifestError> {
        let body = Bytes::from(serde_json::to_vec(&manifest)?);
        let etag = format!("\"{:x}\"", Sha256::digest(&body));
        Ok(Self {
            manifest,
            body,
            etag,
        })
    }
}

pub struct Catalog {
    origin: ManifestOrigin,
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl Catalog {
    pub fn new(origin: ManifestOrigin) -> Self {
        Self {
            origin,
            current: RwLock::new(None),
        }
    }

    /// Start from an already built manifest.
    pub fn preloaded(origin: ManifestOrigin, manifest: GalleryManifest) -> Result<Self, ManifestError> {
        let snapshot = Snapshot::new(manifest)?;
        Ok(Self {
            origin,
            current: RwLock::new(Some(Arc::new(snapshot))),
        })
    }

    /// The cached snapshot, loading it on first use or when `refresh` is set.
    pub async fn snapshot(&self, refresh: bool) -> Result<Arc<Snapshot>, IndexError> {
        if !refresh && let Some(snapshot) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let mut slot = self.current.write().await;
        // Another request may have loaded it while we waited for the lock.
        if !refresh && let Some(snapshot) = slot.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = Arc::new(Snapshot::new(self.load().await?)?);
        tracing::info!(
            target: TRACING_TARGET,
            images = snapshot.manifest.total_images,
            categories = snapshot.manifest.gallery.len(),
            etag = %snapshot.etag,
            "manifest loaded"
        );
        *slot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn load(&self) -> Result<GalleryManifest, IndexError> {
        match &self.origin {
            ManifestOrigin::Store(builder) => builder.build().await,
            ManifestOrigin::File(path) => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(ManifestError::Io)?;
                Ok(serde_json::from_str(&content).map_err(ManifestError::Json)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyScheme, UrlBuilder};
    use crate::test_helpers::gallery_store;
    use tempfile::TempDir;

    fn store_catalog() -> (Arc<crate::store::MemoryStore>, Catalog) {
        let store = gallery_store();
        let builder = IndexBuilder::new(
            store.clone(),
            KeyScheme::new("gallery", "0_preview"),
            UrlBuilder::new("https://cdn.test", ""),
        );
        (store, Catalog::new(ManifestOrigin::Store(builder)))
    }

    #[tokio::test]
    async fn store_scan_is_cached_until_refresh() {
        let (store, catalog) = store_catalog();
        let first = catalog.snapshot(false).await.unwrap();
        let lists = store.stats().lists;
        assert!(lists > 0);

        let again = catalog.snapshot(false).await.unwrap();
        assert_eq!(store.stats().lists, lists);
        assert_eq!(first.etag, again.etag);

        store.insert("gallery/cats/c.jpg", vec![1u8], "image/jpeg");
        let refreshed = catalog.snapshot(true).await.unwrap();
        assert!(store.stats().lists > lists);
        assert_eq!(refreshed.manifest.total_images, first.manifest.total_images + 1);
    }

    #[tokio::test]
    async fn file_origin_reads_persisted_manifest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gallery-index.json");
        let (_, source) = store_catalog();
        let manifest = source.snapshot(false).await.unwrap().manifest.clone();
        manifest.save(&path).unwrap();

        let catalog = Catalog::new(ManifestOrigin::File(path));
        let snapshot = catalog.snapshot(false).await.unwrap();
        assert_eq!(snapshot.manifest, manifest);
    }

    #[tokio::test]
    async fn missing_file_is_manifest_error() {
        let catalog = Catalog::new(ManifestOrigin::File("/nonexistent/gallery-index.json".into()));
        assert!(matches!(
            catalog.snapshot(false).await,
            Err(IndexError::Manifest(ManifestError::Io(_)))
        ));
    }

    #[test]
    fn etag_is_quoted_sha256() {
        let snapshot = Snapshot::new(GalleryManifest::empty()).unwrap();
        assert!(snapshot.etag.starts_with('"') && snapshot.etag.ends_with('"'));
        assert_eq!(snapshot.etag.len(), 66);
    }
}
