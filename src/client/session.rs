//! Per-view render state: what has been revealed, where it went, what comes next.
//!
//! A [`RenderSession`] is created for one gallery view and dropped on
//! navigation. It owns every piece of mutable render state: the image list of
//! the active filter, the reveal cursor, the set of rendered originals, the
//! placed tiles in reveal order and the column layout.
//!
//! ```text
//!            begin_batch                 finish_batch
//!   Idle ───────────────► Loading(id) ───────────────► Idle
//!    ▲                         │                        │
//!    │ select_filter           │ list exhausted         │ list exhausted
//!    │                         ▼                        ▼
//!    └──────────────────── AllLoaded ◄──────────────────┘
//! ```
//!
//! Completions carry the id of the batch that requested them. Once the
//! filter changes or the batch is finished or aborted, completions for the
//! old id are rejected as [`PlaceOutcome::Stale`].

use super::layout::{Breakpoints, ColumnLayout, column_width};
use crate::manifest::{GalleryManifest, ImageDescriptor, ImageFilter};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Loading(BatchId),
    AllLoaded,
}

/// Images to load, in list order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub id: BatchId,
    pub images: Vec<ImageDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    Placed { column: usize },
    /// The original is already on the page in this filter session.
    Duplicate,
    /// The batch is no longer the active one.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// Same column count; heights rescaled in place.
    Unchanged,
    /// Column count changed and every tile was redistributed.
    Relayout { from: usize, to: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub breakpoints: Breakpoints,
    /// Rows revealed per batch; a batch is `columns × rows_per_batch` images.
    pub rows_per_batch: usize,
    /// Lower bound on the batch size.
    pub min_batch: usize,
    /// Distance from the bottom, in pixels, that triggers the next batch.
    pub scroll_threshold: f64,
    pub gap: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            breakpoints: Breakpoints::default(),
            rows_per_batch: 3,
            min_batch: 6,
            scroll_threshold: 800.0,
            gap: 8.0,
        }
    }
}

/// A revealed image with its decoded dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub image: ImageDescriptor,
    pub dimensions: (u32, u32),
}

pub struct RenderSession {
    manifest: GalleryManifest,
    config: SessionConfig,
    filter: ImageFilter,
    queue: Vec<ImageDescriptor>,
    cursor: usize,
    /// Cursor value when the current batch was taken, for aborts.
    batch_start: usize,
    rendered: HashSet<String>,
    placed: Vec<RenderedImage>,
    failed: usize,
    layout: ColumnLayout,
    viewport_width: f64,
    state: RenderState,
    next_batch: u64,
}

impl RenderSession {
    pub fn new(manifest: GalleryManifest, viewport_width: f64, config: SessionConfig) -> Self {
        let columns = config.breakpoints.columns_for(viewport_width);
        let layout = ColumnLayout::new(
            columns,
            column_width(viewport_width, columns, config.gap),
            config.gap,
        );
        let mut session = Self {
            manifest,
            config,
            filter: ImageFilter::All,
            queue: Vec::new(),
            cursor: 0,
            batch_start: 0,
            rendered: HashSet::new(),
            placed: Vec::new(),
            failed: 0,
            layout,
            viewport_width,
            state: RenderState::Idle,
            next_batch: 0,
        };
        session.select_filter(ImageFilter::All);
        session
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn filter(&self) -> &ImageFilter {
        &self.filter
    }

    pub fn manifest(&self) -> &GalleryManifest {
        &self.manifest
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Rendered images in reveal order.
    pub fn rendered(&self) -> &[RenderedImage] {
        &self.placed
    }

    pub fn is_rendered(&self, original: &str) -> bool {
        self.rendered.contains(original)
    }

    pub fn failed_count(&self) -> usize {
        self.failed
    }

    /// Images of the active filter not yet handed out in a batch.
    pub fn remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.cursor)
    }

    pub fn total(&self) -> usize {
        self.queue.len()
    }

    pub fn batch_size(&self) -> usize {
        (self.layout.column_count() * self.config.rows_per_batch).max(self.config.min_batch.max(1))
    }

    /// Switch to `filter`: fresh image list, empty page, dedup set cleared.
    ///
    /// A batch in flight becomes stale.
    pub fn select_filter(&mut self, filter: ImageFilter) {
        self.queue = self.manifest.images(&filter).into_iter().cloned().collect();
        self.filter = filter;
        self.cursor = 0;
        self.batch_start = 0;
        self.rendered.clear();
        self.placed.clear();
        self.failed = 0;
        self.layout = ColumnLayout::new(
            self.layout.column_count(),
            self.layout.column_width(),
            self.config.gap,
        );
        self.state = if self.queue.is_empty() {
            RenderState::AllLoaded
        } else {
            RenderState::Idle
        };
    }

    /// Take the next batch. `None` unless idle with images left.
    pub fn begin_batch(&mut self) -> Option<Batch> {
        if self.state != RenderState::Idle {
            return None;
        }
        let size = self.batch_size();
        let start = self.cursor;
        let mut images = Vec::with_capacity(size);
        while self.cursor < self.queue.len() && images.len() < size {
            let image = &self.queue[self.cursor];
            self.cursor += 1;
            if !self.rendered.contains(&image.original) {
                images.push(image.clone());
            }
        }
        if images.is_empty() {
            self.state = RenderState::AllLoaded;
            return None;
        }
        let id = BatchId(self.next_batch);
        self.next_batch += 1;
        self.batch_start = start;
        self.state = RenderState::Loading(id);
        Some(Batch { id, images })
    }

    fn is_current(&self, batch: BatchId) -> bool {
        self.state == RenderState::Loading(batch)
    }

    /// Attach a loaded image, in completion order.
    pub fn place(
        &mut self,
        batch: BatchId,
        image: &ImageDescriptor,
        dimensions: (u32, u32),
    ) -> PlaceOutcome {
        if !self.is_current(batch) {
            return PlaceOutcome::Stale;
        }
        if !self.rendered.insert(image.original.clone()) {
            return PlaceOutcome::Duplicate;
        }
        let column = self.layout.place(image.original.clone(), dimensions);
        self.placed.push(RenderedImage {
            image: image.clone(),
            dimensions,
        });
        PlaceOutcome::Placed { column }
    }

    /// Record an image that failed to load. It is skipped for this batch.
    pub fn fail(&mut self, batch: BatchId) -> bool {
        if !self.is_current(batch) {
            return false;
        }
        self.failed += 1;
        true
    }

    /// Close the batch. Stale ids leave the state untouched.
    pub fn finish_batch(&mut self, batch: BatchId) -> RenderState {
        if self.is_current(batch) {
            self.state = if self.cursor >= self.queue.len() {
                RenderState::AllLoaded
            } else {
                RenderState::Idle
            };
        }
        self.state
    }

    /// Abandon the batch; its unplaced images are handed out again next time.
    pub fn abort_batch(&mut self, batch: BatchId) {
        if self.is_current(batch) {
            self.cursor = self.batch_start;
            self.state = RenderState::Idle;
        }
    }

    /// Whether a scroll position `distance_to_bottom` pixels from the end
    /// should load the next batch.
    pub fn should_load_more(&self, distance_to_bottom: f64) -> bool {
        self.state == RenderState::Idle && distance_to_bottom <= self.config.scroll_threshold
    }

    /// Scroll handler: the next batch when close enough to the bottom.
    pub fn on_scroll(&mut self, distance_to_bottom: f64) -> Option<Batch> {
        if self.should_load_more(distance_to_bottom) {
            self.begin_batch()
        } else {
            None
        }
    }

    /// Explicit "load more".
    pub fn request_more(&mut self) -> Option<Batch> {
        self.begin_batch()
    }

    /// Viewport resize. Crossing a breakpoint re-lays out, never reloads.
    pub fn resize(&mut self, viewport_width: f64) -> ResizeOutcome {
        self.viewport_width = viewport_width;
        let from = self.layout.column_count();
        let to = self.config.breakpoints.columns_for(viewport_width);
        let width = column_width(viewport_width, to, self.config.gap);
        if from == to {
            self.layout.rescale(width);
            return ResizeOutcome::Unchanged;
        }
        self.layout = ColumnLayout::redistribute(
            self.placed
                .iter()
                .map(|r| (r.image.original.as_str(), r.dimensions)),
            to,
            width,
            self.config.gap,
        );
        ResizeOutcome::Relayout { from, to }
    }

    pub fn viewport_width(&self) -> f64 {
        self.viewport_width
    }
}
