//! Detail view: one image at full size with its capture settings.
//!
//! Opening shows the cached preview at once, blurred, then fetches the
//! original and the EXIF summary concurrently. Every open bumps a
//! generation counter and replaces the cancellation token; a completion is
//! applied only while its generation is still current, so a slow response
//! for an image the user has already left never reaches the view.

use super::ClientError;
use crate::manifest::ImageDescriptor;
use crate::metadata::ExifReport;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loader::TRACING_TARGET;

#[derive(Debug, Clone, PartialEq)]
pub struct OriginalImage {
    pub url: String,
    pub bytes: usize,
}

/// Where the full-size image and its EXIF come from.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn original(&self, image: &ImageDescriptor) -> Result<OriginalImage, ClientError>;
    async fn exif(&self, image: &ImageDescriptor) -> Result<ExifReport, ClientError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Displayed {
    Preview { url: String, blurred: bool },
    Original { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailState {
    pub image: ImageDescriptor,
    pub displayed: Displayed,
    /// `None` until the summary arrives, and for good when the fetch fails.
    pub exif: Option<ExifReport>,
    pub failures: Vec<String>,
}

impl DetailState {
    fn opening(image: &ImageDescriptor) -> Self {
        Self {
            image: image.clone(),
            displayed: Displayed::Preview {
                url: image.preview.clone(),
                blurred: true,
            },
            exif: None,
            failures: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<Option<DetailState>>,
    generation: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<DetailState>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `update` on the open state if `generation` is still current.
    fn apply(&self, generation: u64, update: impl FnOnce(&mut DetailState)) -> bool {
        let mut state = self.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        match state.as_mut() {
            Some(open) => {
                update(open);
                true
            }
            None => false,
        }
    }
}

pub struct DetailView<S: DetailSource + ?Sized> {
    source: Arc<S>,
    shared: Arc<Shared>,
    cancel: Mutex<CancellationToken>,
}

impl<S: DetailSource + ?Sized + 'static> DetailView<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            shared: Arc::new(Shared::default()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// What the view currently shows, `None` when closed.
    pub fn snapshot(&self) -> Option<DetailState> {
        self.shared.lock().clone()
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Show `image`, cancelling anything still loading for the previous one.
    ///
    /// The returned handle resolves once both fetches have settled or been
    /// cancelled; callers need not await it.
    pub fn open(&self, image: &ImageDescriptor) -> JoinHandle<()> {
        let token = self.replace_token();
        let generation = {
            let mut state = self.shared.lock();
            let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = Some(DetailState::opening(image));
            generation
        };
        tracing::debug!(target: TRACING_TARGET, image = %image.original, generation, "detail opened");

        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.shared);
        let image = image.clone();
        tokio::spawn(async move {
            let original = async {
                let result = source.original(&image).await;
                shared.apply(generation, |state| match result {
                    Ok(original) => state.displayed = Displayed::Original { url: original.url },
                    Err(err) => {
                        // Keep the preview, just sharpen it.
                        if let Displayed::Preview { blurred, .. } = &mut state.displayed {
                            *blurred = false;
                        }
                        state.failures.push(format!("original: {err}"));
                    }
                });
            };
            let exif = async {
                let result = source.exif(&image).await;
                shared.apply(generation, |state| match result {
                    Ok(report) => state.exif = Some(report),
                    Err(err) => state.failures.push(format!("exif: {err}")),
                });
            };
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(target: TRACING_TARGET, generation, "detail fetches cancelled");
                }
                _ = futures::future::join(original, exif) => {}
            }
        })
    }

    /// Close the view and drop any fetch still in flight.
    pub fn close(&self) {
        self.replace_token();
        let mut state = self.shared.lock();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        *state = None;
    }

    fn replace_token(&self) -> CancellationToken {
        let mut current = self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        current.cancel();
        *current = CancellationToken::new();
        current.clone()
    }
}
