//! Object store adapter.
//!
//! Everything above this layer sees keyed binary blobs through four calls:
//! `get`, `put`, `head`, and paginated `list_page`. [`ObjectStore::list_all`]
//! hides pagination by following continuation tokens until none remain.
//!
//! Implementations:
//! - [`S3Store`]: any S3-compatible bucket through `aws-sdk-s3`.
//! - [`MemoryStore`]: in-process map, used by tests and `backend = "memory"`.
//!
//! Transient failures surface as [`StoreError::Unavailable`]. Nothing here
//! retries; callers decide.

mod memory;
mod s3;

pub use memory::MemoryStore;
pub use s3::{S3Options, S3Store};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const TRACING_TARGET: &str = "bucket_gal::store";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),
}

/// Metadata returned by `head` and listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    /// Token for the next page; `None` on the last page.
    pub continuation: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location, e.g. `s3://photos`, for logs.
    fn describe(&self) -> String;

    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StoreError>;

    /// Lightweight existence probe. `Ok(None)` when the key is absent.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError>;

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, StoreError>;

    /// Every object under `prefix`, across all pages.
    async fn list_all(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        let mut objects = Vec::new();
        let mut token = None;
        let mut pages = 0usize;
        loop {
            let page = self.list_page(prefix, token).await?;
            pages += 1;
            objects.extend(page.objects);
            match page.continuation {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        tracing::debug!(
            target: TRACING_TARGET,
            store = %self.describe(),
            prefix,
            pages,
            objects = objects.len(),
            "listing complete"
        );
        Ok(objects)
    }
}

pub type SharedStore = Arc<dyn ObjectStore>;

/// Bound a store call in time.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
