//! S3-compatible object store.

use super::{ListPage, ObjectMeta, ObjectStore, StoreError, TRACING_TARGET};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Connection settings. Credentials come from the standard AWS provider chain.
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible servers (MinIO, R2, ...).
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(options: &S3Options) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(options.region.clone()));
        if let Some(endpoint) = &options.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        let config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(options.force_path_style)
            .build();

        tracing::info!(
            target: TRACING_TARGET,
            bucket = %options.bucket,
            endpoint = options.endpoint.as_deref().unwrap_or("aws"),
            "connected S3 client"
        );

        Self {
            client: Client::from_conf(config),
            bucket: options.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Names of every bucket visible to the credentials.
    pub async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| unavailable("list_buckets", e))?;
        Ok(response
            .buckets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|b| b.name)
            .collect())
    }
}

fn unavailable(op: &str, err: impl std::error::Error) -> StoreError {
    let message = format!("{op}: {}", aws_sdk_s3::error::DisplayErrorContext(&err));
    tracing::warn!(target: TRACING_TARGET, error = %message, "S3 request failed");
    StoreError::Unavailable(message)
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3Store {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StoreError::NotFound(key.to_string())
                } else {
                    unavailable("get_object", err)
                }
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| unavailable("get_object body", e))?;
        Ok(body.into_bytes())
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StoreError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| unavailable("put_object", e))?;
        tracing::debug!(target: TRACING_TARGET, key, size, "put object");
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => Ok(Some(ObjectMeta {
                key: key.to_string(),
                size: response.content_length.unwrap_or(0).max(0) as u64,
                content_type: response.content_type,
                last_modified: response.last_modified.as_ref().and_then(to_chrono),
            })),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(unavailable("head_object", err)),
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, StoreError> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix);
        if let Some(token) = continuation {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| unavailable("list_objects_v2", e))?;

        let objects = response
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|object| {
                let key = object.key?;
                Some(ObjectMeta {
                    key,
                    size: object.size.unwrap_or(0).max(0) as u64,
                    content_type: None,
                    last_modified: object.last_modified.as_ref().and_then(to_chrono),
                })
            })
            .collect();

        let continuation = if response.is_truncated == Some(true) {
            if response.next_continuation_token.is_none() {
                tracing::warn!(
                    target: TRACING_TARGET,
                    bucket = %self.bucket,
                    prefix,
                    "listing truncated but no continuation token provided"
                );
            }
            response.next_continuation_token
        } else {
            None
        };

        Ok(ListPage {
            objects,
            continuation,
        })
    }
}
