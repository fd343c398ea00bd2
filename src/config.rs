//! Gallery configuration.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Stock defaults (see [`stock_config_toml`]).
//! 2. `gallery.toml` (or the file given with `--config`), sparse: override
//!    only what you need. Merged over the defaults with [`merge_toml`].
//! 3. Environment variables, after loading a `.env` file if present:
//!
//! | Variable | Setting |
//! |---|---|
//! | `S3_BUCKET` | `storage.bucket` |
//! | `S3_ENDPOINT` | `storage.endpoint` |
//! | `S3_REGION` | `storage.region` |
//! | `DIRECTORY_PREFIX` | `storage.prefix` |
//! | `IMAGE_BASE_URL` | `public.image_base_url` |
//! | `BIND_ADDR` | `server.bind` |
//!
//! AWS credentials are read by the AWS SDK itself (`AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY`, profiles, ...) and never pass through here.
//!
//! ## Partial Configuration
//!
//! ```toml
//! [thumbnails]
//! width = 320
//! policy = "background"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{OutputFormat, Quality, TransformOptions};
use crate::keys::{KeyScheme, UrlBuilder};
use crate::store::S3Options;
use crate::thumbnail::{GenerationPolicy, ThumbnailSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "gallery.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full gallery configuration. Every section has defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryConfig {
    pub storage: StorageConfig,
    pub public: PublicConfig,
    pub thumbnails: ThumbnailsConfig,
    pub exif: ExifConfig,
    pub index: IndexConfig,
    pub server: ServerConfig,
    pub convert: ConvertConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    /// Custom endpoint for S3-compatible servers. Omit for AWS.
    pub endpoint: Option<String>,
    pub region: String,
    /// Collection root inside the bucket.
    pub prefix: String,
    pub force_path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            bucket: String::new(),
            endpoint: None,
            region: "us-east-1".to_string(),
            prefix: "gallery".to_string(),
            force_path_style: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublicConfig {
    /// Where objects are publicly readable. Empty derives it from the storage settings.
    pub image_base_url: String,
    /// Prefix of this server's routes when mounted below `/`.
    pub app_base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    pub width: u32,
    pub quality: u32,
    pub format: OutputFormat,
    pub strip_orientation: bool,
    pub policy: GenerationPolicy,
    pub fetch_timeout_secs: u64,
    pub preview_dir: String,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            width: 200,
            quality: 80,
            format: OutputFormat::Webp,
            strip_orientation: true,
            policy: GenerationPolicy::Sync,
            fetch_timeout_secs: 10,
            preview_dir: crate::keys::DEFAULT_PREVIEW_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExifConfig {
    pub timeout_secs: u64,
}

impl Default for ExifConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Where `bucket-gal index` writes the manifest.
    pub path: String,
    pub with_exif: bool,
    /// Parallel EXIF fetches and preview generations.
    pub concurrency: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: crate::manifest::MANIFEST_FILENAME.to_string(),
            with_exif: false,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestSource {
    /// Scan the store on first request and keep the result in memory.
    #[default]
    Store,
    /// Serve the file written by `bucket-gal index`.
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub static_dir: Option<String>,
    pub manifest_source: ManifestSource,
    /// Notifications buffered per slow subscriber before it starts missing some.
    pub notification_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            static_dir: None,
            manifest_source: ManifestSource::Store,
            notification_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    pub width: u32,
    pub quality: u32,
    pub format: OutputFormat,
    /// Maximum parallel workers. `None` means one per CPU core.
    pub max_processes: Option<usize>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            width: 400,
            quality: 80,
            format: OutputFormat::Webp,
            max_processes: None,
        }
    }
}

impl GalleryConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thumbnails.quality > 100 {
            return Err(ConfigError::Validation(
                "thumbnails.quality must be 0-100".into(),
            ));
        }
        if self.convert.quality > 100 {
            return Err(ConfigError::Validation("convert.quality must be 0-100".into()));
        }
        if self.thumbnails.width == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.width must be non-zero".into(),
            ));
        }
        if self.convert.width == 0 {
            return Err(ConfigError::Validation("convert.width must be non-zero".into()));
        }
        if self.storage.backend == StorageBackend::S3 && self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.bucket is required for the s3 backend (or set S3_BUCKET)".into(),
            ));
        }
        let preview_dir = self.thumbnails.preview_dir.trim();
        if preview_dir.is_empty() || preview_dir.contains('/') {
            return Err(ConfigError::Validation(
                "thumbnails.preview_dir must be a single path segment".into(),
            ));
        }
        if self.index.concurrency == 0 {
            return Err(ConfigError::Validation(
                "index.concurrency must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("S3_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = get("S3_ENDPOINT") {
            self.storage.endpoint = Some(v);
        }
        if let Some(v) = get("S3_REGION") {
            self.storage.region = v;
        }
        if let Some(v) = get("DIRECTORY_PREFIX") {
            self.storage.prefix = v;
        }
        if let Some(v) = get("IMAGE_BASE_URL") {
            self.public.image_base_url = v;
        }
        if let Some(v) = get("BIND_ADDR") {
            self.server.bind = v;
        }
    }

    /// Public base URL of stored objects.
    ///
    /// Falls back to `<endpoint>/<bucket>` for custom endpoints and to the
    /// virtual-hosted AWS URL otherwise.
    pub fn image_base_url(&self) -> String {
        if !self.public.image_base_url.is_empty() {
            return self.public.image_base_url.trim_end_matches('/').to_string();
        }
        match &self.storage.endpoint {
            Some(endpoint) => format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                self.storage.bucket
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com",
                self.storage.bucket, self.storage.region
            ),
        }
    }

    pub fn key_scheme(&self) -> KeyScheme {
        KeyScheme::new(&self.storage.prefix, &self.thumbnails.preview_dir)
    }

    pub fn url_builder(&self) -> UrlBuilder {
        UrlBuilder::new(&self.image_base_url(), &self.public.app_base_url)
    }

    pub fn s3_options(&self) -> S3Options {
        S3Options {
            bucket: self.storage.bucket.clone(),
            region: self.storage.region.clone(),
            endpoint: self.storage.endpoint.clone(),
            force_path_style: self.storage.force_path_style,
        }
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            target_width: self.thumbnails.width,
            quality: Quality::new(self.thumbnails.quality),
            output_format: self.thumbnails.format,
            strip_orientation: self.thumbnails.strip_orientation,
        }
    }

    pub fn thumbnail_settings(&self) -> ThumbnailSettings {
        ThumbnailSettings {
            options: self.transform_options(),
            policy: self.thumbnails.policy,
            fetch_timeout: Duration::from_secs(self.thumbnails.fetch_timeout_secs),
        }
    }

    pub fn convert_options(&self) -> TransformOptions {
        TransformOptions {
            target_width: self.convert.width,
            quality: Quality::new(self.convert.quality),
            output_format: self.convert.format,
            strip_orientation: true,
        }
    }

    pub fn exif_timeout(&self) -> Duration {
        Duration::from_secs(self.exif.timeout_secs)
    }
}

/// Resolve the effective thread count for batch conversion.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ConvertConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(GalleryConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` when it doesn't exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults and deserialize.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<GalleryConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    Ok(merged.try_into()?)
}

/// Load `path` over the defaults, apply environment overrides, validate.
pub fn load_config<F>(path: &Path, env: F) -> Result<GalleryConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = resolve_config(load_raw_config(path)?)?;
    config.apply_env(env);
    config.validate()?;
    Ok(config)
}

/// A documented stock `gallery.toml` with every default spelled out.
pub fn stock_config_toml() -> &'static str {
    r##"# bucket-gal configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Environment variables override this file:
#   S3_BUCKET, S3_ENDPOINT, S3_REGION, DIRECTORY_PREFIX, IMAGE_BASE_URL, BIND_ADDR
# A .env file in the working directory is loaded first.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Object storage
# ---------------------------------------------------------------------------
[storage]
# "s3" for any S3-compatible bucket, "memory" for an empty in-process store.
backend = "s3"
bucket = ""
# Custom endpoint for MinIO, R2, Ceph, ... Omit for AWS.
# endpoint = "http://localhost:9000"
region = "us-east-1"
# Collection root inside the bucket. Categories are its subdirectories.
prefix = "gallery"
# Path-style URLs (http://host/bucket/key), needed by most self-hosted servers.
force_path_style = false

# ---------------------------------------------------------------------------
# Public URLs
# ---------------------------------------------------------------------------
[public]
# Where browsers can read objects. Empty derives it from [storage].
image_base_url = ""
# Prefix of this server's routes when mounted below "/".
app_base_url = ""

# ---------------------------------------------------------------------------
# Previews (generated on first request, then served from the bucket)
# ---------------------------------------------------------------------------
[thumbnails]
# Maximum width in pixels; height follows the aspect ratio and is capped at
# four times the width. Smaller originals are never enlarged.
width = 200
# Encoding quality (1-100) for both WebP and JPEG.
quality = 80
# "webp" or "jpeg"
format = "webp"
# Rotate pixels according to EXIF orientation.
strip_orientation = true
# "sync": the request waits for generation.
# "background": redirect at once, generate in the background.
policy = "sync"
# Time budget for fetching an original.
fetch_timeout_secs = 10
# Previews live under <prefix>/<preview_dir>/...
preview_dir = "0_preview"

# ---------------------------------------------------------------------------
# Capture metadata
# ---------------------------------------------------------------------------
[exif]
# Time budget for fetching an original; on timeout the summary is empty.
timeout_secs = 5

# ---------------------------------------------------------------------------
# Index generation
# ---------------------------------------------------------------------------
[index]
path = "gallery-index.json"
# Embed an EXIF summary per JPEG (fetches every original).
with_exif = false
concurrency = 8

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
bind = "0.0.0.0:3000"
# Directory served under /static.
# static_dir = "static"
# "store": scan the bucket (cached, ?refresh=true rescans).
# "file": serve [index].path as written by `bucket-gal index`.
manifest_source = "store"
notification_buffer = 64

# ---------------------------------------------------------------------------
# Batch conversion (bucket-gal convert)
# ---------------------------------------------------------------------------
[convert]
width = 400
quality = 80
format = "webp"
# Maximum parallel workers. Omit to use every CPU core.
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("gallery.toml");
        fs::write(&path, body).unwrap();
        path
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn default_thumbnail_settings() {
        let config = GalleryConfig::default();
        assert_eq!(config.thumbnails.width, 200);
        assert_eq!(config.thumbnails.quality, 80);
        assert_eq!(config.thumbnails.format, OutputFormat::Webp);
        assert!(config.thumbnails.strip_orientation);
        assert_eq!(config.thumbnails.preview_dir, "0_preview");
        assert_eq!(config.convert.width, 400);
        assert_eq!(config.exif.timeout_secs, 5);
    }

    #[test]
    fn stock_toml_matches_defaults() {
        let parsed: GalleryConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(parsed, GalleryConfig::default());
    }

    // =========================================================================
    // Loading and merging
    // =========================================================================

    #[test]
    fn missing_file_gives_defaults_plus_env() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(
            &tmp.path().join("absent.toml"),
            env_from(&[("S3_BUCKET", "photos")]),
        )
        .unwrap();
        assert_eq!(config.storage.bucket, "photos");
        assert_eq!(config.thumbnails.width, 200);
    }

    #[test]
    fn sparse_file_overrides_only_its_keys() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[storage]
bucket = "photos"

[thumbnails]
width = 320
policy = "background"
"#,
        );
        let config = load_config(&path, no_env).unwrap();
        assert_eq!(config.thumbnails.width, 320);
        assert_eq!(config.thumbnails.policy, GenerationPolicy::Background);
        assert_eq!(config.thumbnails.quality, 80);
        assert_eq!(config.storage.region, "us-east-1");
    }

    #[test]
    fn env_wins_over_file() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[storage]
bucket = "from-file"
prefix = "file-prefix"
"#,
        );
        let config = load_config(
            &path,
            env_from(&[
                ("S3_BUCKET", "from-env"),
                ("DIRECTORY_PREFIX", "env-prefix"),
                ("S3_ENDPOINT", "http://minio:9000"),
                ("BIND_ADDR", "127.0.0.1:8080"),
            ]),
        )
        .unwrap();
        assert_eq!(config.storage.bucket, "from-env");
        assert_eq!(config.storage.prefix, "env-prefix");
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = GalleryConfig::default();
        config.apply_env(env_from(&[("S3_REGION", "  ")]));
        assert_eq!(config.storage.region, "us-east-1");
    }

    #[test]
    fn unknown_key_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[thumbnails]\nwidht = 10\n");
        assert!(load_config(&path, env_from(&[("S3_BUCKET", "b")])).is_err());
    }

    #[test]
    fn invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[storage\n");
        assert!(matches!(
            load_config(&path, no_env),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn valid() -> GalleryConfig {
        let mut config = GalleryConfig::default();
        config.storage.bucket = "photos".into();
        config
    }

    #[test]
    fn validate_default_with_bucket_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_requires_bucket_for_s3() {
        assert!(GalleryConfig::default().validate().is_err());
        let mut memory = GalleryConfig::default();
        memory.storage.backend = StorageBackend::Memory;
        assert!(memory.validate().is_ok());
    }

    #[test]
    fn validate_quality_too_high() {
        let mut config = valid();
        config.thumbnails.quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_zero_width() {
        let mut config = valid();
        config.convert.width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_preview_dir_single_segment() {
        let mut config = valid();
        config.thumbnails.preview_dir = "a/b".into();
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // Derived values
    // =========================================================================

    #[test]
    fn image_base_url_fallbacks() {
        let mut config = valid();
        assert_eq!(
            config.image_base_url(),
            "https://photos.s3.us-east-1.amazonaws.com"
        );
        config.storage.endpoint = Some("http://localhost:9000/".into());
        assert_eq!(config.image_base_url(), "http://localhost:9000/photos");
        config.public.image_base_url = "https://cdn.example.com/".into();
        assert_eq!(config.image_base_url(), "https://cdn.example.com");
    }

    #[test]
    fn thumbnail_settings_from_config() {
        let mut config = valid();
        config.thumbnails.format = OutputFormat::Jpeg;
        config.thumbnails.fetch_timeout_secs = 3;
        let settings = config.thumbnail_settings();
        assert_eq!(settings.options.output_format, OutputFormat::Jpeg);
        assert_eq!(settings.fetch_timeout, Duration::from_secs(3));
        assert_eq!(config.key_scheme().root, "gallery");
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ConvertConfig {
            max_processes: Some(1),
            ..ConvertConfig::default()
        };
        assert_eq!(effective_threads(&config), 1);
    }
}
