//! Batch loading pipeline.
//!
//! A [`Batch`] becomes a stream of probes, at most `concurrency` in flight,
//! requested in list order and yielded in completion order. Each completion
//! is fed straight into the session's placement stage. Cancelling the token
//! ends the stream; probes still in flight are dropped, so nothing they would
//! have produced is ever placed.

use super::ClientError;
use super::session::{Batch, BatchId, PlaceOutcome, RenderSession, RenderState, ResizeOutcome};
use crate::manifest::{ImageDescriptor, ImageFilter};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const TRACING_TARGET: &str = "bucket_gal::client";

/// Loads an image far enough to know its dimensions.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn probe(&self, image: &ImageDescriptor) -> Result<(u32, u32), ClientError>;
}

#[derive(Debug)]
pub struct LoadCompletion {
    pub batch: BatchId,
    pub image: ImageDescriptor,
    pub result: Result<(u32, u32), ClientError>,
}

/// Probe every image of `batch`, `concurrency` at a time, until `cancel` fires.
pub fn load_batch<P>(
    probe: Arc<P>,
    batch: Batch,
    concurrency: usize,
    cancel: CancellationToken,
) -> impl Stream<Item = LoadCompletion> + Send
where
    P: ImageProbe + ?Sized + 'static,
{
    let id = batch.id;
    futures::stream::iter(batch.images)
        .map(move |image| {
            let probe = Arc::clone(&probe);
            async move {
                let result = probe.probe(&image).await;
                LoadCompletion {
                    batch: id,
                    image,
                    result,
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .take_until(async move { cancel.cancelled().await })
}

/// What happened to one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub placed: usize,
    pub duplicates: usize,
    pub failed: Vec<(String, ClientError)>,
    pub cancelled: bool,
}

/// Drives a [`RenderSession`] with a probe.
pub struct RenderController<P: ImageProbe + ?Sized> {
    session: RenderSession,
    probe: Arc<P>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl<P: ImageProbe + ?Sized + 'static> RenderController<P> {
    pub fn new(session: RenderSession, probe: Arc<P>, concurrency: usize) -> Self {
        Self {
            session,
            probe,
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    /// Token that cancels the batch in flight, for use from another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel whatever is loading and show `filter` from the top.
    pub fn select_filter(&mut self, filter: ImageFilter) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.session.select_filter(filter);
    }

    pub fn resize(&mut self, viewport_width: f64) -> ResizeOutcome {
        self.session.resize(viewport_width)
    }

    /// Load the next batch, if the session has one to give.
    pub async fn load_next(&mut self) -> Option<BatchReport> {
        let batch = self.session.begin_batch()?;
        Some(self.run(batch).await)
    }

    pub async fn on_scroll(&mut self, distance_to_bottom: f64) -> Option<BatchReport> {
        let batch = self.session.on_scroll(distance_to_bottom)?;
        Some(self.run(batch).await)
    }

    /// Load batches until the filter's list is exhausted or a batch is cancelled.
    pub async fn load_all(&mut self) -> Vec<BatchReport> {
        let mut reports = Vec::new();
        while let Some(report) = self.load_next().await {
            let cancelled = report.cancelled;
            reports.push(report);
            if cancelled {
                break;
            }
        }
        reports
    }

    async fn run(&mut self, batch: Batch) -> BatchReport {
        let id = batch.id;
        let expected = batch.images.len();
        tracing::debug!(target: TRACING_TARGET, batch = %id, images = expected, "batch started");

        let mut completions = Box::pin(load_batch(
            Arc::clone(&self.probe),
            batch,
            self.concurrency,
            self.cancel.clone(),
        ));
        let mut report = BatchReport::default();
        let mut seen = 0usize;
        while let Some(completion) = completions.next().await {
            seen += 1;
            match completion.result {
                Ok(dimensions) => {
                    match self.session.place(completion.batch, &completion.image, dimensions) {
                        PlaceOutcome::Placed { .. } => report.placed += 1,
                        PlaceOutcome::Duplicate => report.duplicates += 1,
                        PlaceOutcome::Stale => {}
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        image = %completion.image.original,
                        error = %err,
                        "image failed to load"
                    );
                    self.session.fail(completion.batch);
                    report.failed.push((completion.image.original, err));
                }
            }
        }

        if seen < expected || self.cancel.is_cancelled() {
            report.cancelled = true;
            self.session.abort_batch(id);
        } else {
            self.session.finish_batch(id);
        }
        tracing::debug!(
            target: TRACING_TARGET,
            batch = %id,
            placed = report.placed,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "batch finished"
        );
        report
    }

    pub fn state(&self) -> RenderState {
        self.session.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::session::SessionConfig;
    use crate::index::IndexBuilder;
    use crate::keys::{KeyScheme, UrlBuilder};
    use crate::manifest::GalleryManifest;
    use crate::store::MemoryStore;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn manifest(n: usize) -> GalleryManifest {
        IndexBuilder::new(
            Arc::new(MemoryStore::new()),
            KeyScheme::new("gallery", "0_preview"),
            UrlBuilder::new("https://cdn.test", ""),
        )
        .build_from_keys((0..n).map(|i| format!("gallery/cats/{i:02}.jpg")))
    }

    /// Later list entries finish first; entries named in `broken` fail.
    #[derive(Default)]
    struct ScriptedProbe {
        broken: HashSet<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageProbe for ScriptedProbe {
        async fn probe(&self, image: &ImageDescriptor) -> Result<(u32, u32), ClientError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let n: u64 = image.name.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(50 - n.min(49))).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(image.filename.clone());
            if self.broken.contains(&image.filename) {
                return Err(ClientError::Load(image.filename.clone()));
            }
            Ok((400, 300))
        }
    }

    /// Never completes.
    struct HangingProbe;

    #[async_trait]
    impl ImageProbe for HangingProbe {
        async fn probe(&self, _image: &ImageDescriptor) -> Result<(u32, u32), ClientError> {
            std::future::pending().await
        }
    }

    fn session(n: usize) -> RenderSession {
        RenderSession::new(manifest(n), 1000.0, SessionConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn completions_arrive_in_completion_order() {
        let probe = Arc::new(ScriptedProbe::default());
        let mut controller = RenderController::new(session(4), Arc::clone(&probe), 4);

        let report = controller.load_next().await.unwrap();

        assert_eq!(report.placed, 4);
        let order = probe.order.lock().unwrap().clone();
        assert_eq!(order, vec!["03.jpg", "02.jpg", "01.jpg", "00.jpg"]);
        let revealed: Vec<_> = controller
            .session()
            .rendered()
            .iter()
            .map(|r| r.image.filename.clone())
            .collect();
        assert_eq!(revealed, order);
        assert_eq!(controller.state(), RenderState::AllLoaded);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let probe = Arc::new(ScriptedProbe::default());
        let mut controller = RenderController::new(session(9), Arc::clone(&probe), 2);
        controller.load_next().await.unwrap();
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_batch() {
        let probe = Arc::new(ScriptedProbe {
            broken: ["01.jpg".to_string()].into_iter().collect(),
            ..ScriptedProbe::default()
        });
        let mut controller = RenderController::new(session(3), probe, 3);

        let report = controller.load_next().await.unwrap();

        assert_eq!(report.placed, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("01.jpg"));
        assert_eq!(controller.session().failed_count(), 1);
        assert_eq!(controller.state(), RenderState::AllLoaded);
    }

    #[tokio::test(start_paused = true)]
    async fn load_all_reveals_every_image_exactly_once() {
        let probe = Arc::new(ScriptedProbe::default());
        let mut controller = RenderController::new(session(25), probe, 4);

        let reports = controller.load_all().await;

        assert_eq!(reports.len(), 3);
        let originals: HashSet<_> = controller
            .session()
            .rendered()
            .iter()
            .map(|r| r.image.original.clone())
            .collect();
        assert_eq!(originals.len(), 25);
        assert_eq!(controller.session().rendered().len(), 25);
    }

    #[tokio::test]
    async fn cancellation_ends_batch_without_placing() {
        let mut controller = RenderController::new(session(5), Arc::new(HangingProbe), 3);
        let token = controller.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let report = controller.load_next().await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.placed, 0);
        assert!(controller.session().rendered().is_empty());
        assert_eq!(controller.state(), RenderState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn filter_change_resets_and_reloads() {
        let probe = Arc::new(ScriptedProbe::default());
        let mut controller = RenderController::new(session(4), probe, 4);
        controller.load_next().await.unwrap();
        assert_eq!(controller.session().rendered().len(), 4);

        controller.select_filter(ImageFilter::Category("cats".into()));
        assert!(controller.session().rendered().is_empty());
        let report = controller.load_next().await.unwrap();
        assert_eq!(report.placed, 4);
    }
}
