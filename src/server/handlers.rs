//! Route handlers.

use super::error::HttpError;
use super::notify::Notification;
use super::page::render_gallery;
use super::{AppState, TRACING_TARGET};
use crate::metadata::ExifReport;
use crate::store::StoreError;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ImagesQuery {
    #[serde(default)]
    refresh: bool,
}

/// True when any entity tag in `If-None-Match` matches `etag`.
fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|tag| tag.trim().trim_start_matches("W/"))
        .any(|tag| tag == "*" || tag == etag)
}

/// `GET /images`
pub(crate) async fn images(
    State(state): State<AppState>,
    Query(query): Query<ImagesQuery>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let snapshot = state.catalog.snapshot(query.refresh).await?;
    let etag = HeaderValue::from_str(&snapshot.etag)
        .map_err(|e| HttpError::Internal(format!("invalid etag: {e}")))?;

    if !query.refresh && etag_matches(&headers, &snapshot.etag) {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::ETAG, etag),
        ],
        snapshot.body.clone(),
    )
        .into_response())
}

/// `GET /thumbnail/{*key}`: 302 to the preview, generating it on a miss.
pub(crate) async fn thumbnail(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Response, HttpError> {
    let key = state
        .urls
        .key_from_reference(&reference)
        .ok_or_else(|| HttpError::Unprocessable(format!("invalid image key '{reference}'")))?;
    let resolution = state.cache.resolve(&key).await?;
    tracing::debug!(
        target: TRACING_TARGET,
        key = %key,
        outcome = ?resolution.outcome,
        "thumbnail redirect"
    );
    let location = HeaderValue::from_str(&resolution.url)
        .map_err(|e| HttpError::Internal(format!("invalid preview url: {e}")))?;
    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, location),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
    )
        .into_response())
}

/// `GET /exif/{*key}`: always answers with the report shape.
pub(crate) async fn exif(State(state): State<AppState>, Path(reference): Path<String>) -> Response {
    let Some(key) = state.urls.key_from_reference(&reference) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ExifReport::failed(format!("invalid image reference '{reference}'"))),
        )
            .into_response();
    };

    match state.exif.extract(&key).await {
        Ok(report) => Json(report).into_response(),
        Err(StoreError::NotFound(missing)) => (
            StatusCode::NOT_FOUND,
            Json(ExifReport::failed(format!("original not found: {missing}"))),
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(target: TRACING_TARGET, key = %key, error = %err, "EXIF request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExifReport::failed(err.to_string())),
            )
                .into_response()
        }
    }
}

/// `GET /config`
pub(crate) async fn config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "IMAGE_BASE_URL": state.urls.image_base_url }))
}

/// `GET /notifications`: server-sent events, one `{message}` per event.
pub(crate) async fn notifications(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::debug!(
        target: TRACING_TARGET,
        subscribers = state.notifier.subscriber_count() + 1,
        "notification subscriber connected"
    );
    let stream = state
        .notifier
        .subscribe()
        .map(|notification| Event::default().event("message").json_data(notification));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `POST /notifications`
pub(crate) async fn publish(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> impl IntoResponse {
    let delivered = state.notifier.publish(notification);
    tracing::info!(target: TRACING_TARGET, delivered, "notification published");
    (StatusCode::ACCEPTED, Json(json!({ "delivered": delivered })))
}

/// `GET /healthz`
pub(crate) async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "thumbnails": state.cache.stats(),
    }))
}

/// `GET /`
pub(crate) async fn index_page(State(state): State<AppState>) -> Result<Html<String>, HttpError> {
    let snapshot = state.catalog.snapshot(false).await?;
    let markup = render_gallery(&snapshot.manifest, &state.urls.app_base_url);
    Ok(Html(markup.into_string()))
}
