//! reqwest client for the gallery routes.

use super::ClientError;
use super::detail::{DetailSource, OriginalImage};
use super::loader::{ImageProbe, TRACING_TARGET};
use crate::imaging::{ImageBackend, RustBackend};
use crate::manifest::{GalleryManifest, ImageDescriptor};
use crate::metadata::ExifReport;
use crate::server::Notification;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Pause between a dropped notification stream and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublicConfig {
    #[serde(rename = "IMAGE_BASE_URL")]
    pub image_base_url: String,
}

#[derive(Debug, Clone)]
pub struct GalleryClient {
    http: reqwest::Client,
    base: Url,
}

impl GalleryClient {
    /// Client for the server mounted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve a reference the way a page at the base URL would.
    pub fn resolve(&self, reference: &str) -> Result<Url, ClientError> {
        Ok(self.base.join(reference)?)
    }

    async fn fetch(&self, url: Url) -> Result<reqwest::Response, ClientError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    pub async fn try_manifest(&self) -> Result<GalleryManifest, ClientError> {
        let url = self.resolve("images")?;
        Ok(self.fetch(url).await?.json().await?)
    }

    /// The manifest, or an empty gallery when it cannot be fetched.
    pub async fn manifest(&self) -> GalleryManifest {
        match self.try_manifest().await {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::warn!(target: TRACING_TARGET, error = %err, "manifest unavailable, showing an empty gallery");
                GalleryManifest::empty()
            }
        }
    }

    /// `GET /exif/{key}`.
    pub async fn exif_for_key(&self, key: &str) -> Result<ExifReport, ClientError> {
        let url = self.resolve(&format!("exif/{}", urlencoding::encode(key)))?;
        Ok(self.fetch(url).await?.json().await?)
    }

    pub async fn config(&self) -> Result<PublicConfig, ClientError> {
        let url = self.resolve("config")?;
        Ok(self.fetch(url).await?.json().await?)
    }

    /// Publish a notification. Returns how many subscribers received it.
    pub async fn publish(&self, message: &str) -> Result<usize, ClientError> {
        #[derive(Deserialize)]
        struct Accepted {
            delivered: usize,
        }

        let url = self.resolve("notifications")?;
        let response = self
            .http
            .post(url.clone())
            .json(&Notification {
                message: message.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let accepted: Accepted = response.json().await?;
        Ok(accepted.delivered)
    }

    pub fn notifications(&self) -> Result<NotificationListener, ClientError> {
        Ok(NotificationListener {
            http: self.http.clone(),
            url: self.resolve("notifications")?,
            retry_delay: RECONNECT_DELAY,
        })
    }
}

#[async_trait]
impl ImageProbe for GalleryClient {
    /// Fetch the preview, following the redirect, and read its dimensions.
    async fn probe(&self, image: &ImageDescriptor) -> Result<(u32, u32), ClientError> {
        let url = self.resolve(&image.preview)?;
        let bytes = self.fetch(url).await?.bytes().await?;
        let dimensions = RustBackend::new()
            .identify(&bytes)
            .map_err(|err| ClientError::Decode(format!("{}: {err}", image.preview)))?;
        Ok((dimensions.width, dimensions.height))
    }
}

#[async_trait]
impl DetailSource for GalleryClient {
    async fn original(&self, image: &ImageDescriptor) -> Result<OriginalImage, ClientError> {
        let url = self.resolve(&image.original)?;
        let response = self.fetch(url).await?;
        let url = response.url().to_string();
        let bytes = response.bytes().await?;
        Ok(OriginalImage {
            url,
            bytes: bytes.len(),
        })
    }

    async fn exif(&self, image: &ImageDescriptor) -> Result<ExifReport, ClientError> {
        self.exif_for_key(image.key.as_str()).await
    }
}

/// Follows `/notifications`, reconnecting after [`RECONNECT_DELAY`] whenever
/// the stream fails or ends.
pub struct NotificationListener {
    http: reqwest::Client,
    url: Url,
    retry_delay: Duration,
}

impl NotificationListener {
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Forward notifications to `sender` until `cancel` fires or the
    /// receiver is dropped.
    pub fn spawn(
        self,
        sender: mpsc::Sender<Notification>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(sender, cancel).await })
    }

    pub async fn run(&self, sender: mpsc::Sender<Notification>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.stream_once(&sender) => match result {
                    Ok(()) => tracing::debug!(target: TRACING_TARGET, "notification stream ended"),
                    Err(err) => tracing::warn!(
                        target: TRACING_TARGET,
                        error = %err,
                        retry_in = ?self.retry_delay,
                        "notification stream failed"
                    ),
                },
            }
            if sender.is_closed() {
                return;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }

    async fn stream_once(&self, sender: &mpsc::Sender<Notification>) -> Result<(), ClientError> {
        let response = self
            .http
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                url: self.url.to_string(),
            });
        }

        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            let event = event.map_err(|err| ClientError::Load(err.to_string()))?;
            if event.data.is_empty() {
                continue;
            }
            match serde_json::from_str::<Notification>(&event.data) {
                Ok(notification) => {
                    if sender.send(notification).await.is_err() {
                        return Ok(());
                    }
                }
                Err(err) => {
                    tracing::debug!(target: TRACING_TARGET, error = %err, data = %event.data, "ignoring malformed notification");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serve `/notifications` from `respond`, which sees the 0-based attempt.
    async fn notification_stub<F>(respond: F) -> (GalleryClient, Arc<AtomicUsize>)
    where
        F: Fn(usize) -> axum::response::Response + Clone + Send + Sync + 'static,
    {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let app = Router::new().route(
            "/notifications",
            get(move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                let respond = respond.clone();
                async move { respond(attempt) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = GalleryClient::new(&format!("http://{addr}/")).unwrap();
        (client, attempts)
    }

    fn event_stream(message: &str) -> axum::response::Response {
        let body = format!("data: {{\"message\":\"{message}\"}}\n\n");
        ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
    }

    async fn next(rx: &mut mpsc::Receiver<Notification>) -> Notification {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no notification in time")
            .expect("listener stopped")
    }

    #[test]
    fn base_gains_trailing_slash() {
        let client = GalleryClient::new("http://localhost:3000/gallery").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:3000/gallery/");
    }

    #[test]
    fn references_resolve_like_a_page() {
        let client = GalleryClient::new("http://localhost:3000/app").unwrap();
        assert_eq!(
            client.resolve("/thumbnail/gallery%2Fcats%2Fa.jpg").unwrap().as_str(),
            "http://localhost:3000/thumbnail/gallery%2Fcats%2Fa.jpg"
        );
        assert_eq!(
            client.resolve("images").unwrap().as_str(),
            "http://localhost:3000/app/images"
        );
        assert_eq!(
            client.resolve("https://cdn.test/gallery/cats/a.jpg").unwrap().as_str(),
            "https://cdn.test/gallery/cats/a.jpg"
        );
    }

    #[tokio::test]
    async fn unreachable_server_yields_empty_gallery() {
        // Port 9 (discard) on loopback is closed in test environments.
        let client = GalleryClient::new("http://127.0.0.1:9/").unwrap();
        let manifest = client.manifest().await;
        assert_eq!(manifest.total_images, 0);
        assert!(manifest.gallery.is_empty());
    }

    // =========================================================================
    // Notification listener
    // =========================================================================

    #[tokio::test]
    async fn listener_retries_after_failed_connection() {
        let (client, attempts) = notification_stub(|attempt| {
            if attempt == 0 {
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            } else {
                event_stream("back online")
            }
        })
        .await;
        let retry_delay = Duration::from_millis(50);
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();
        let handle = client
            .notifications()
            .unwrap()
            .with_retry_delay(retry_delay)
            .spawn(tx, cancel.clone());

        assert_eq!(next(&mut rx).await.message, "back online");
        assert!(started.elapsed() >= retry_delay);
        assert!(attempts.load(Ordering::SeqCst) >= 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn listener_reconnects_when_stream_ends() {
        let (client, attempts) = notification_stub(|attempt| match attempt {
            0 => event_stream("first"),
            _ => event_stream("second"),
        })
        .await;
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = client
            .notifications()
            .unwrap()
            .with_retry_delay(Duration::from_millis(20))
            .spawn(tx, cancel.clone());

        assert_eq!(next(&mut rx).await.message, "first");
        assert_eq!(next(&mut rx).await.message, "second");
        assert!(attempts.load(Ordering::SeqCst) >= 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn listener_stops_when_receiver_is_dropped() {
        let (client, _attempts) = notification_stub(|_| event_stream("hello")).await;
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = client
            .notifications()
            .unwrap()
            .with_retry_delay(Duration::from_millis(10))
            .spawn(tx, CancellationToken::new());

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("listener kept running")
            .unwrap();
    }
}
