//! One-shot batch conversion of a local directory of originals.
//!
//! `bucket-gal convert <input> <output>` walks `input`, resizes every
//! supported image to the configured width and writes it under `output`
//! with the same relative path and the output format's extension:
//!
//! ```text
//! photos/                      previews/
//! ├── cats/a.jpg        →      ├── cats/a.webp
//! └── dogs/puppy.png    →      └── dogs/puppy.webp
//! ```
//!
//! Files run in parallel on the rayon pool. Outputs that already exist are
//! skipped unless `force` is set, so re-running after adding a few photos
//! only touches the new ones. A failing file is reported and the batch goes
//! on.

use crate::imaging::{BackendError, ImageBackend, RustBackend, TransformOptions, convert_file};
use crate::keys::IMAGE_EXTENSIONS;
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Input is not a directory: {0}")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ConvertJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub options: TransformOptions,
    /// Re-encode even when the output already exists.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Converted { width: u32, height: u32 },
    Skipped,
    Failed(String),
}

/// Progress events, sent from worker threads as files finish.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertEvent {
    Started {
        total: usize,
    },
    FileDone {
        /// 1-based position in the sorted source list.
        index: usize,
        source: PathBuf,
        output: PathBuf,
        status: FileStatus,
    },
}

#[derive(Debug, Default, PartialEq)]
pub struct ConvertSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl fmt::Display for ConvertSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} converted, {} skipped", self.converted, self.skipped)?;
        if !self.failed.is_empty() {
            write!(f, ", {} failed", self.failed.len())?;
        }
        Ok(())
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Supported images below `input`, sorted, hidden files and directories skipped.
pub fn collect_sources(input: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    if !input.is_dir() {
        return Err(ConvertError::NotADirectory(input.to_path_buf()));
    }
    let mut sources = Vec::new();
    for entry in WalkDir::new(input)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry?;
        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            sources.push(entry.into_path());
        }
    }
    Ok(sources)
}

/// `input/cats/a.jpg` → `output/cats/a.<ext>`.
pub fn output_path_for(input: &Path, source: &Path, output: &Path, extension: &str) -> PathBuf {
    let relative = source.strip_prefix(input).unwrap_or(source);
    output.join(relative).with_extension(extension)
}

/// Convert with the production backend.
pub fn convert_dir(
    job: &ConvertJob,
    progress: Option<Sender<ConvertEvent>>,
) -> Result<ConvertSummary, ConvertError> {
    convert_dir_with_backend(&RustBackend::new(), job, progress)
}

/// Convert using a specific backend (allows testing with mock).
pub fn convert_dir_with_backend<B: ImageBackend + ?Sized>(
    backend: &B,
    job: &ConvertJob,
    progress: Option<Sender<ConvertEvent>>,
) -> Result<ConvertSummary, ConvertError> {
    let sources = collect_sources(&job.input)?;
    std::fs::create_dir_all(&job.output)?;
    let extension = job.options.output_format.extension();

    if let Some(tx) = &progress {
        tx.send(ConvertEvent::Started {
            total: sources.len(),
        })
        .ok();
    }

    let statuses: Vec<(PathBuf, FileStatus)> = sources
        .par_iter()
        .enumerate()
        .map(|(i, source)| {
            let output = output_path_for(&job.input, source, &job.output, extension);
            let status = if output.exists() && !job.force {
                FileStatus::Skipped
            } else {
                match convert_file(backend, source, &output, &job.options) {
                    Ok(preview) => FileStatus::Converted {
                        width: preview.width,
                        height: preview.height,
                    },
                    Err(err) => FileStatus::Failed(describe(&err)),
                }
            };
            if let Some(tx) = &progress {
                tx.send(ConvertEvent::FileDone {
                    index: i + 1,
                    source: source.clone(),
                    output,
                    status: status.clone(),
                })
                .ok();
            }
            (source.clone(), status)
        })
        .collect();

    let mut summary = ConvertSummary::default();
    for (source, status) in statuses {
        match status {
            FileStatus::Converted { .. } => summary.converted += 1,
            FileStatus::Skipped => summary.skipped += 1,
            FileStatus::Failed(message) => summary.failed.push((source, message)),
        }
    }
    Ok(summary)
}

fn describe(err: &BackendError) -> String {
    match err {
        BackendError::Io(e) => format!("io: {e}"),
        BackendError::Decode(msg) => format!("decode: {msg}"),
        BackendError::Encode(msg) => format!("encode: {msg}"),
    }
}
