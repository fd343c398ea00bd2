//! Lazily generated previews, cached in the object store itself.
//!
//! Given an original key, [`ThumbnailCache::resolve`] returns a public URL of
//! its preview, generating the preview first when it doesn't exist yet.
//!
//! # Design
//!
//! ## Cache entries
//!
//! There is no cache manifest. The derived key is a pure function of the
//! original key (see [`KeyScheme::derive`]), and **the existence of an object
//! at the derived key is the cache entry**. A lookup is one `head` call:
//!
//! 1. Derive the preview key.
//! 2. `head` it. Present → [`Outcome::Hit`], no bytes are fetched or transformed.
//! 3. Absent → fetch the original (bounded by `fetch_timeout`), transform it
//!    on the blocking pool, `put` the result with its content type.
//!
//! Staleness is never checked: no content hash, no timestamp comparison.
//! Originals are treated as write-once, and a preview is never invalidated
//! or deleted by this crate.
//!
//! ## Concurrent misses
//!
//! Check-then-write is not atomic. Two requests that miss on the same key at
//! the same time both generate, and both write the same derived key; the
//! second write overwrites the first with an equivalent image. This
//! at-least-once behaviour is accepted: there is no per-key lock and no
//! global cap on concurrent generations.
//!
//! ## Policies
//!
//! - [`GenerationPolicy::Sync`]: the request waits for generation and
//!   gets [`Outcome::Generated`].
//! - [`GenerationPolicy::Background`]: generation is spawned and the URL is
//!   returned at once with [`Outcome::Scheduled`]. The URL answers 404 until
//!   the write lands; the browser retries on its next view.
//!
//! ## Failures
//!
//! A missing original is [`ThumbnailError::SourceNotFound`]; there is no
//! fallback image. Decode and encode failures are not retried. Store
//! failures surface as [`ThumbnailError::StoreUnavailable`] for the caller
//! to retry. Every failure is logged and counted in [`CacheStats`].

use crate::imaging::{BackendError, ImageBackend, Preview, TransformOptions, create_preview};
use crate::keys::{DerivedKey, ImageKey, KeyScheme, UrlBuilder};
use crate::store::{SharedStore, StoreError, with_timeout};
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const TRACING_TARGET: &str = "bucket_gal::thumbnail";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailError {
    #[error("invalid image key '{0}'")]
    InvalidKey(String),
    #[error("original not found: {0}")]
    SourceNotFound(String),
    #[error("cannot decode {key}: {message}")]
    Decode { key: String, message: String },
    #[error("cannot encode preview of {key}: {message}")]
    Encode { key: String, message: String },
    #[error("object store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation task failed: {0}")]
    Task(String),
}

impl ThumbnailError {
    fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => ThumbnailError::SourceNotFound(key),
            StoreError::Unavailable(message) => ThumbnailError::StoreUnavailable(message),
            StoreError::Timeout(limit) => ThumbnailError::Timeout(limit),
        }
    }

    fn from_backend(key: &ImageKey, err: BackendError) -> Self {
        match err {
            BackendError::Decode(message) => ThumbnailError::Decode {
                key: key.to_string(),
                message,
            },
            BackendError::Io(err) => ThumbnailError::Decode {
                key: key.to_string(),
                message: err.to_string(),
            },
            BackendError::Encode(message) => ThumbnailError::Encode {
                key: key.to_string(),
                message,
            },
        }
    }
}

/// When a miss is generated relative to the request that found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPolicy {
    #[default]
    Sync,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The preview already existed.
    Hit,
    /// The preview was generated and written during this call.
    Generated,
    /// Generation was spawned; the preview may not exist yet.
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub derived_key: DerivedKey,
    pub url: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy)]
pub struct ThumbnailSettings {
    pub options: TransformOptions,
    pub policy: GenerationPolicy,
    pub fetch_timeout: Duration,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            options: TransformOptions::default(),
            policy: GenerationPolicy::Sync,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Running counters, shared by every clone of a [`ThumbnailCache`].
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    generated: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub generated: u64,
    pub failures: u64,
}

impl CacheStats {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn generate(&self) {
        self.generated.fetch_add(1, Ordering::Relaxed);
    }

    fn fail(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl CacheStatsSnapshot {
    pub fn total(&self) -> u64 {
        self.hits + self.generated + self.failures
    }
}

impl fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(f, "{} cached, {} generated", self.hits, self.generated)?;
        } else {
            write!(f, "{} generated", self.generated)?;
        }
        if self.failures > 0 {
            write!(f, ", {} failed", self.failures)?;
        }
        if self.hits > 0 || self.failures > 0 {
            write!(f, " ({} total)", self.total())?;
        }
        Ok(())
    }
}

/// Result of [`ThumbnailCache::warm`].
#[derive(Debug, Default)]
pub struct WarmReport {
    pub hits: usize,
    pub generated: usize,
    pub failed: Vec<(ImageKey, ThumbnailError)>,
}

#[derive(Clone)]
pub struct ThumbnailCache {
    store: SharedStore,
    backend: Arc<dyn ImageBackend>,
    scheme: KeyScheme,
    urls: UrlBuilder,
    settings: ThumbnailSettings,
    stats: Arc<CacheStats>,
}

impl ThumbnailCache {
    pub fn new(
        store: SharedStore,
        backend: Arc<dyn ImageBackend>,
        scheme: KeyScheme,
        urls: UrlBuilder,
        settings: ThumbnailSettings,
    ) -> Self {
        Self {
            store,
            backend,
            scheme,
            urls,
            settings,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn settings(&self) -> &ThumbnailSettings {
        &self.settings
    }

    /// Derived key for `key`. Pure: never touches the store.
    pub fn derived_key(&self, key: &ImageKey) -> DerivedKey {
        self.scheme
            .derive(key, self.settings.options.output_format.extension())
    }

    fn validate(&self, key: &ImageKey) -> Result<(), ThumbnailError> {
        let raw = key.as_str();
        if raw.trim().is_empty() || raw.ends_with('/') || self.scheme.is_preview(raw) {
            return Err(ThumbnailError::InvalidKey(raw.to_string()));
        }
        Ok(())
    }

    /// URL of the preview of `key`, generating it on a miss per the configured policy.
    pub async fn resolve(&self, key: &ImageKey) -> Result<Resolution, ThumbnailError> {
        self.resolve_with(key, self.settings.policy).await
    }

    async fn resolve_with(
        &self,
        key: &ImageKey,
        policy: GenerationPolicy,
    ) -> Result<Resolution, ThumbnailError> {
        self.validate(key)?;
        let derived_key = self.derived_key(key);
        let url = self.urls.object_url(derived_key.as_str());

        let existing = self.store.head(derived_key.as_str()).await.map_err(|err| {
            self.stats.fail();
            tracing::warn!(target: TRACING_TARGET, key = %key, error = %err, "preview lookup failed");
            ThumbnailError::from_store(err)
        })?;

        if existing.is_some() {
            self.stats.hit();
            tracing::debug!(target: TRACING_TARGET, key = %key, derived = %derived_key, "preview hit");
            return Ok(Resolution {
                derived_key,
                url,
                outcome: Outcome::Hit,
            });
        }

        match policy {
            GenerationPolicy::Sync => {
                self.generate_logged(key, &derived_key).await?;
                Ok(Resolution {
                    derived_key,
                    url,
                    outcome: Outcome::Generated,
                })
            }
            GenerationPolicy::Background => {
                let cache = self.clone();
                let key = key.clone();
                let target = derived_key.clone();
                tokio::spawn(async move {
                    // Failures are logged and counted inside.
                    let _ = cache.generate_logged(&key, &target).await;
                });
                Ok(Resolution {
                    derived_key,
                    url,
                    outcome: Outcome::Scheduled,
                })
            }
        }
    }

    async fn generate_logged(
        &self,
        key: &ImageKey,
        derived_key: &DerivedKey,
    ) -> Result<Preview, ThumbnailError> {
        let started = Instant::now();
        match self.generate(key, derived_key).await {
            Ok(preview) => {
                self.stats.generate();
                tracing::info!(
                    target: TRACING_TARGET,
                    key = %key,
                    derived = %derived_key,
                    width = preview.width,
                    height = preview.height,
                    bytes = preview.bytes.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "preview generated"
                );
                Ok(preview)
            }
            Err(err) => {
                self.stats.fail();
                tracing::warn!(target: TRACING_TARGET, key = %key, error = %err, "preview generation failed");
                Err(err)
            }
        }
    }

    /// Fetch, transform, write. Never touches the original.
    async fn generate(
        &self,
        key: &ImageKey,
        derived_key: &DerivedKey,
    ) -> Result<Preview, ThumbnailError> {
        let source = with_timeout(self.settings.fetch_timeout, self.store.get(key.as_str()))
            .await
            .map_err(ThumbnailError::from_store)?;

        let backend = Arc::clone(&self.backend);
        let options = self.settings.options;
        let preview = tokio::task::spawn_blocking(move || {
            create_preview(backend.as_ref(), &source, &options)
        })
        .await
        .map_err(|e| ThumbnailError::Task(e.to_string()))?
        .map_err(|e| ThumbnailError::from_backend(key, e))?;

        self.store
            .put(
                derived_key.as_str(),
                Bytes::from(preview.bytes.clone()),
                preview.content_type,
            )
            .await
            .map_err(ThumbnailError::from_store)?;
        Ok(preview)
    }

    /// Make sure every key has a preview, generating up to `concurrency` at a time.
    ///
    /// Existing previews are left alone.
    pub async fn warm(&self, keys: Vec<ImageKey>, concurrency: usize) -> WarmReport {
        let results: Vec<(ImageKey, Result<Resolution, ThumbnailError>)> =
            futures::stream::iter(keys)
                .map(|key| async move {
                    let result = self.resolve_with(&key, GenerationPolicy::Sync).await;
                    (key, result)
                })
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;

        let mut report = WarmReport::default();
        for (key, result) in results {
            match result {
                Ok(Resolution {
                    outcome: Outcome::Hit,
                    ..
                }) => report.hits += 1,
                Ok(_) => report.generated += 1,
                Err(err) => report.failed.push((key, err)),
            }
        }
        report
    }
}
