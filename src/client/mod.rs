//! Browser-side controller, modelled as a Rust library.
//!
//! The page script's behaviour lives here so it can be driven and tested
//! without a browser:
//!
//! - [`layout`]: breakpoints and greedy shortest-column placement
//! - [`session`]: reveal cursor, dedup, batches and filter/resize handling
//! - [`loader`]: the bounded-concurrency load pipeline feeding a session
//! - [`detail`]: the cancellable full-size view
//! - [`http`]: a reqwest client for the server's routes
//!
//! ```text
//! GalleryClient::manifest ──► RenderSession ──► RenderController
//!                                   ▲                 │ probe (n at a time)
//!                                   └── place/fail ◄──┘
//! ```

pub mod detail;
pub mod http;
pub mod layout;
pub mod loader;
pub mod session;

pub use detail::{DetailSource, DetailState, DetailView, Displayed, OriginalImage};
pub use http::{GalleryClient, NotificationListener};
pub use layout::{Breakpoints, ColumnLayout, Tile};
pub use loader::{BatchReport, ImageProbe, LoadCompletion, RenderController, load_batch};
pub use session::{
    Batch, BatchId, PlaceOutcome, RenderSession, RenderState, RenderedImage, ResizeOutcome,
    SessionConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered {status}")]
    Status { status: u16, url: String },
    #[error("load failed: {0}")]
    Load(String),
    #[error("not an image: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}
