//! Server errors. Request failures render as `{"error": "..."}`.

use crate::index::IndexError;
use crate::manifest::ManifestError;
use crate::store::StoreError;
use crate::thumbnail::ThumbnailError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    Internal(String),
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("Server error: {0}")]
    Runtime(#[source] io::Error),
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ThumbnailError> for HttpError {
    fn from(err: ThumbnailError) -> Self {
        match err {
            ThumbnailError::SourceNotFound(_) => HttpError::NotFound(err.to_string()),
            ThumbnailError::InvalidKey(_) | ThumbnailError::Decode { .. } => {
                HttpError::Unprocessable(err.to_string())
            }
            ThumbnailError::StoreUnavailable(message) => HttpError::Unavailable(message),
            ThumbnailError::Timeout(limit) => HttpError::Timeout(limit),
            ThumbnailError::Encode { .. } | ThumbnailError::Task(_) => {
                HttpError::Internal(err.to_string())
            }
        }
    }
}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => HttpError::NotFound(format!("object not found: {key}")),
            StoreError::Unavailable(message) => HttpError::Unavailable(message),
            StoreError::Timeout(limit) => HttpError::Timeout(limit),
        }
    }
}

impl From<IndexError> for HttpError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Store(err) => err.into(),
            IndexError::Manifest(ManifestError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                HttpError::NotFound(format!("manifest not found: {err}"))
            }
            IndexError::Manifest(err) => HttpError::Internal(format!("manifest unreadable: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_errors_map_to_statuses() {
        let cases = [
            (ThumbnailError::SourceNotFound("k".into()), StatusCode::NOT_FOUND),
            (ThumbnailError::InvalidKey("k/".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                ThumbnailError::Decode {
                    key: "k".into(),
                    message: "bad".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ThumbnailError::StoreUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ThumbnailError::Timeout(Duration::from_secs(1)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (ThumbnailError::Task("panic".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(HttpError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn body_is_error_json() {
        let response = HttpError::NotFound("original not found: x".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "original not found: x");
    }

    #[test]
    fn missing_manifest_file_is_not_found() {
        let err = IndexError::Manifest(ManifestError::Io(io::Error::from(io::ErrorKind::NotFound)));
        assert_eq!(HttpError::from(err).status(), StatusCode::NOT_FOUND);
    }
}
