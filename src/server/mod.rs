//! HTTP surface of the gallery.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | Server-rendered gallery shell |
//! | `GET /images` | Manifest JSON, `?refresh=true` rescans, `ETag` / `If-None-Match` |
//! | `GET /thumbnail/{*key}` | 302 to the preview, generated on first request |
//! | `GET /exif/{*key}` | `{FNumber, ExposureTime, ISO, summary}` of an original |
//! | `GET /config` | `{IMAGE_BASE_URL}` |
//! | `GET /notifications` | Server-sent `{message}` events |
//! | `POST /notifications` | Publish a `{message}` |
//! | `GET /healthz` | Status and preview cache counters |
//! | `GET /static/*` | Files from `server.static_dir` |
//!
//! Keys in `/thumbnail` and `/exif` are percent-encoded as one segment;
//! `/exif` also accepts an object URL.

pub mod catalog;
pub mod error;
mod handlers;
pub mod notify;
mod page;

pub use catalog::{Catalog, ManifestOrigin, Snapshot};
pub use error::{HttpError, ServerError};
pub use notify::{Notification, Notifier};

use crate::config::{GalleryConfig, ManifestSource};
use crate::imaging::ImageBackend;
use crate::index::IndexBuilder;
use crate::keys::UrlBuilder;
use crate::metadata::MetadataExtractor;
use crate::store::SharedStore;
use crate::thumbnail::ThumbnailCache;
use axum::Router;
use axum::routing::get;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub const TRACING_TARGET: &str = "bucket_gal::server";
const TRACING_TARGET_SHUTDOWN: &str = "bucket_gal::server::shutdown";

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: ThumbnailCache,
    pub exif: MetadataExtractor,
    pub catalog: Arc<Catalog>,
    pub urls: UrlBuilder,
    pub notifier: Notifier,
}

impl AppState {
    pub fn from_config(
        config: &GalleryConfig,
        store: SharedStore,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        let scheme = config.key_scheme();
        let urls = config.url_builder();
        let exif = MetadataExtractor::new(Arc::clone(&store), config.exif_timeout());
        let cache = ThumbnailCache::new(
            Arc::clone(&store),
            backend,
            scheme.clone(),
            urls.clone(),
            config.thumbnail_settings(),
        );
        let origin = match config.server.manifest_source {
            ManifestSource::Store => {
                let mut builder = IndexBuilder::new(store, scheme, urls.clone());
                if config.index.with_exif {
                    builder = builder.with_exif(exif.clone(), config.index.concurrency);
                }
                ManifestOrigin::Store(builder)
            }
            ManifestSource::File => ManifestOrigin::File(PathBuf::from(&config.index.path)),
        };
        Self {
            cache,
            exif,
            catalog: Arc::new(Catalog::new(origin)),
            urls,
            notifier: Notifier::new(config.server.notification_buffer),
        }
    }
}

pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::index_page))
        .route("/images", get(handlers::images))
        .route("/thumbnail/{*key}", get(handlers::thumbnail))
        .route("/exif/{*key}", get(handlers::exif))
        .route("/config", get(handlers::config))
        .route(
            "/notifications",
            get(handlers::notifications).post(handlers::publish),
        )
        .route("/healthz", get(handlers::healthz));

    if let Some(dir) = static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Bind `addr` and serve until Ctrl+C or SIGTERM.
pub async fn serve(router: Router, addr: &str) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })?;
    let local = listener.local_addr().map_err(ServerError::Runtime)?;
    tracing::info!(target: TRACING_TARGET, addr = %local, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Runtime)?;

    tracing::info!(target: TRACING_TARGET_SHUTDOWN, "server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: TRACING_TARGET_SHUTDOWN, error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        } else {
            tracing::info!(target: TRACING_TARGET_SHUTDOWN, "received Ctrl+C, shutting down");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!(target: TRACING_TARGET_SHUTDOWN, "received SIGTERM, shutting down");
            }
            Err(e) => {
                tracing::error!(target: TRACING_TARGET_SHUTDOWN, error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
