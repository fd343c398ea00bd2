//! Object keys, derived preview keys, and public URLs.
//!
//! Originals live in the bucket under a collection root:
//!
//! ```text
//! gallery/                         # collection root (DIRECTORY_PREFIX)
//! ├── cats/                        # category = first segment below the root
//! │   ├── 001-tabby.jpg
//! │   └── a.jpg
//! └── 0_preview/                   # derived previews, never listed as originals
//!     └── cats/
//!         ├── 001-tabby.webp
//!         └── a.webp
//! ```
//!
//! ## Derived keys
//!
//! The preview key is a pure path transform of the original key: the preview
//! directory is inserted right below the collection root and the extension is
//! replaced by the output format's. Cache lookups therefore never need a
//! reverse index, and the same original always maps to the same preview.
//!
//! ## Display names
//!
//! Filenames and category directories follow the `NNN-name` convention: an
//! optional numeric prefix orders entries and is stripped for display.
//! Dashes and underscores in the remaining name are shown as spaces:
//! - `020-My-Best-Photos` → "My Best Photos"
//! - `001-tabby.jpg` → "tabby"
//! - `summer_2023` → "summer 2023"

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default name of the preview subtree below the collection root.
pub const DEFAULT_PREVIEW_DIR: &str = "0_preview";

/// Extensions the gallery treats as originals.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tif", "tiff"];

/// Key of an original object, e.g. `gallery/cats/a.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageKey(String);

impl ImageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, e.g. `a.jpg`.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(pos) if pos > 0 => &name[..pos],
            _ => name,
        }
    }

    /// Lowercased extension, if the file name has one.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(pos) if pos > 0 && pos + 1 < name.len() => Some(name[pos + 1..].to_lowercase()),
            _ => None,
        }
    }

    /// Whether the extension is one of [`IMAGE_EXTENSIONS`].
    pub fn is_supported_image(&self) -> bool {
        self.extension()
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }

    /// JPEG originals are the only ones we read EXIF from.
    pub fn is_jpeg(&self) -> bool {
        matches!(self.extension().as_deref(), Some("jpg" | "jpeg"))
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Key of a derived preview object, e.g. `gallery/0_preview/cats/a.webp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivedKey(String);

impl DerivedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Layout of originals and previews inside the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    /// Collection root without trailing slash. Empty means the bucket root.
    pub root: String,
    /// Name of the preview subtree below the root.
    pub preview_dir: String,
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self::new("", DEFAULT_PREVIEW_DIR)
    }
}

impl KeyScheme {
    pub fn new(root: &str, preview_dir: &str) -> Self {
        Self {
            root: root.trim_matches('/').to_string(),
            preview_dir: preview_dir.trim_matches('/').to_string(),
        }
    }

    /// Listing prefix for the whole collection (`"gallery/"`, or `""`).
    pub fn listing_prefix(&self) -> String {
        if self.root.is_empty() {
            String::new()
        } else {
            format!("{}/", self.root)
        }
    }

    /// Split a key into `(collection, remainder)`.
    ///
    /// Keys under the configured root split there. Other keys use their
    /// first segment as the collection; single-segment keys have an empty
    /// collection.
    fn split_collection<'a>(&self, key: &'a str) -> (&'a str, &'a str) {
        if !self.root.is_empty()
            && let Some(rest) = key
                .strip_prefix(self.root.as_str())
                .and_then(|r| r.strip_prefix('/'))
        {
            return (&key[..self.root.len()], rest);
        }
        if self.root.is_empty() {
            return ("", key);
        }
        match key.find('/') {
            Some(pos) => (&key[..pos], &key[pos + 1..]),
            None => ("", key),
        }
    }

    /// Compute the preview key for an original. Pure: never consults storage.
    ///
    /// ```
    /// # use bucket_gal::keys::{ImageKey, KeyScheme};
    /// let scheme = KeyScheme::new("gallery", "0_preview");
    /// let derived = scheme.derive(&ImageKey::new("gallery/cats/a.jpg"), "webp");
    /// assert_eq!(derived.as_str(), "gallery/0_preview/cats/a.webp");
    /// ```
    pub fn derive(&self, key: &ImageKey, extension: &str) -> DerivedKey {
        let (collection, rest) = self.split_collection(key.as_str());
        let rest = match rest.rfind('.') {
            Some(dot) if dot > rest.rfind('/').map_or(0, |slash| slash + 1) => &rest[..dot],
            _ => rest,
        };
        let derived = if collection.is_empty() {
            format!("{}/{}.{}", self.preview_dir, rest, extension)
        } else {
            format!("{}/{}/{}.{}", collection, self.preview_dir, rest, extension)
        };
        DerivedKey(derived)
    }

    /// Whether a key lies inside the preview subtree.
    pub fn is_preview(&self, key: &str) -> bool {
        let marker = format!("/{}/", self.preview_dir);
        key.contains(&marker) || key.starts_with(&format!("{}/", self.preview_dir))
    }

    /// First path segment below the root, or `None` for root-level files.
    pub fn category_of<'a>(&self, key: &'a ImageKey) -> Option<&'a str> {
        let (_, rest) = self.split_collection(key.as_str());
        let (category, remainder) = rest.split_once('/')?;
        if category.is_empty() || remainder.is_empty() {
            None
        } else {
            Some(category)
        }
    }
}

/// Result of parsing a numbered entry name like `020-My-Best-Photos`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Number prefix if present (e.g., `20` from `020-My-Best-Photos`)
    pub number: Option<u32>,
    /// Raw name part after `NNN-`. For unnumbered entries, the full input.
    pub name: String,
    /// Display title: separators converted to spaces.
    pub display_title: String,
}

/// Parse an entry name following the `NNN-name` convention.
///
/// - `"020-My-Best-Photos"` → number=Some(20), display_title="My Best Photos"
/// - `"001"` → number=Some(1), name="", display_title=""
/// - `"summer_2023"` → number=None, display_title="summer 2023"
pub fn parse_entry_name(name: &str) -> ParsedName {
    if let Some(dash_pos) = name.find('-') {
        let prefix = &name[..dash_pos];
        if let Ok(num) = prefix.parse::<u32>() {
            let raw = &name[dash_pos + 1..];
            return ParsedName {
                number: Some(num),
                name: raw.to_string(),
                display_title: display_title(raw),
            };
        }
    }
    if let Ok(num) = name.parse::<u32>() {
        return ParsedName {
            number: Some(num),
            name: String::new(),
            display_title: String::new(),
        };
    }
    ParsedName {
        number: None,
        name: name.to_string(),
        display_title: display_title(name),
    }
}

fn display_title(raw: &str) -> String {
    raw.replace(['-', '_'], " ").trim().to_string()
}

/// Display name for an original: parsed stem, falling back to the raw stem
/// when the name is number-only.
pub fn display_name(key: &ImageKey) -> String {
    let parsed = parse_entry_name(key.stem());
    if parsed.display_title.is_empty() {
        key.stem().to_string()
    } else {
        parsed.display_title
    }
}

/// Builds the public URLs handed to browsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBuilder {
    /// Where objects are publicly readable, e.g. `https://cdn.example.com/bucket`.
    pub image_base_url: String,
    /// Where this server is mounted. Empty produces root-relative routes.
    pub app_base_url: String,
}

impl UrlBuilder {
    pub fn new(image_base_url: &str, app_base_url: &str) -> Self {
        Self {
            image_base_url: image_base_url.trim_end_matches('/').to_string(),
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Direct URL of a stored object. Each path segment is percent-encoded.
    pub fn object_url(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.image_base_url, encoded.join("/"))
    }

    /// Route that resolves (and lazily generates) the preview of `key`.
    pub fn thumbnail_route(&self, key: &ImageKey) -> String {
        format!(
            "{}/thumbnail/{}",
            self.app_base_url,
            urlencoding::encode(key.as_str())
        )
    }

    /// Route returning the EXIF reading of `key`.
    pub fn exif_route(&self, key: &ImageKey) -> String {
        format!(
            "{}/exif/{}",
            self.app_base_url,
            urlencoding::encode(key.as_str())
        )
    }

    /// Turn a key, an object URL, or any absolute URL into an [`ImageKey`].
    ///
    /// Object URLs under [`image_base_url`](Self::image_base_url) map back
    /// to their key exactly. Other absolute URLs contribute their decoded
    /// path. Anything else is taken as a key verbatim.
    pub fn key_from_reference(&self, reference: &str) -> Option<ImageKey> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if !self.image_base_url.is_empty()
            && let Some(rest) = reference
                .strip_prefix(self.image_base_url.as_str())
                .and_then(|r| r.strip_prefix('/'))
        {
            return decode_path(rest);
        }
        if reference.starts_with("http://") || reference.starts_with("https://") {
            let parsed = url::Url::parse(reference).ok()?;
            return decode_path(parsed.path().trim_start_matches('/'));
        }
        Some(ImageKey::new(reference.trim_start_matches('/')))
    }
}

fn decode_path(path: &str) -> Option<ImageKey> {
    let decoded = urlencoding::decode(path).ok()?;
    if decoded.is_empty() {
        None
    } else {
        Some(ImageKey::new(decoded.into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> KeyScheme {
        KeyScheme::new("gallery", DEFAULT_PREVIEW_DIR)
    }

    // =========================================================================
    // Derived keys
    // =========================================================================

    #[test]
    fn derive_inserts_preview_dir_and_swaps_extension() {
        let derived = scheme().derive(&ImageKey::new("gallery/cats/a.jpg"), "webp");
        assert_eq!(derived.as_str(), "gallery/0_preview/cats/a.webp");
    }

    #[test]
    fn derive_is_pure() {
        let key = ImageKey::new("gallery/dogs/001-rex.JPG");
        let first = scheme().derive(&key, "webp");
        let second = scheme().derive(&key, "webp");
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "gallery/0_preview/dogs/001-rex.webp");
    }

    #[test]
    fn derive_keeps_nested_paths() {
        let derived = scheme().derive(&ImageKey::new("gallery/travel/japan/tokyo.png"), "jpg");
        assert_eq!(derived.as_str(), "gallery/0_preview/travel/japan/tokyo.jpg");
    }

    #[test]
    fn derive_outside_root_uses_first_segment() {
        let derived = scheme().derive(&ImageKey::new("other/cats/a.jpg"), "webp");
        assert_eq!(derived.as_str(), "other/0_preview/cats/a.webp");
    }

    #[test]
    fn derive_with_empty_root() {
        let scheme = KeyScheme::default();
        let derived = scheme.derive(&ImageKey::new("cats/a.jpg"), "webp");
        assert_eq!(derived.as_str(), "0_preview/cats/a.webp");
    }

    #[test]
    fn derive_without_extension_appends_one() {
        let derived = scheme().derive(&ImageKey::new("gallery/cats/raw"), "webp");
        assert_eq!(derived.as_str(), "gallery/0_preview/cats/raw.webp");
    }

    #[test]
    fn derive_ignores_dots_in_directories() {
        let derived = scheme().derive(&ImageKey::new("gallery/v1.2/photo"), "webp");
        assert_eq!(derived.as_str(), "gallery/0_preview/v1.2/photo.webp");
    }

    #[test]
    fn is_preview_detects_subtree() {
        let s = scheme();
        assert!(s.is_preview("gallery/0_preview/cats/a.webp"));
        assert!(s.is_preview("0_preview/cats/a.webp"));
        assert!(!s.is_preview("gallery/cats/0_preview.jpg"));
        assert!(!s.is_preview("gallery/cats/a.jpg"));
    }

    #[test]
    fn category_is_first_segment_below_root() {
        let s = scheme();
        assert_eq!(s.category_of(&"gallery/cats/a.jpg".into()), Some("cats"));
        assert_eq!(s.category_of(&"gallery/travel/japan/t.jpg".into()), Some("travel"));
        assert_eq!(s.category_of(&"gallery/loose.jpg".into()), None);
    }

    // =========================================================================
    // ImageKey accessors
    // =========================================================================

    #[test]
    fn key_parts() {
        let key = ImageKey::new("gallery/cats/001-tabby.JPEG");
        assert_eq!(key.file_name(), "001-tabby.JPEG");
        assert_eq!(key.stem(), "001-tabby");
        assert_eq!(key.extension().as_deref(), Some("jpeg"));
        assert!(key.is_supported_image());
        assert!(key.is_jpeg());
    }

    #[test]
    fn hidden_file_has_no_extension() {
        let key = ImageKey::new("gallery/cats/.DS_Store");
        assert_eq!(key.extension(), None);
        assert!(!key.is_supported_image());
    }

    // =========================================================================
    // Entry names
    // =========================================================================

    #[test]
    fn numbered_with_multi_word_name() {
        let p = parse_entry_name("020-My-Best-Photos");
        assert_eq!(p.number, Some(20));
        assert_eq!(p.name, "My-Best-Photos");
        assert_eq!(p.display_title, "My Best Photos");
    }

    #[test]
    fn number_only() {
        let p = parse_entry_name("001");
        assert_eq!(p.number, Some(1));
        assert_eq!(p.display_title, "");
    }

    #[test]
    fn underscores_become_spaces() {
        let p = parse_entry_name("summer_2023");
        assert_eq!(p.number, None);
        assert_eq!(p.display_title, "summer 2023");
    }

    #[test]
    fn display_name_falls_back_to_stem() {
        assert_eq!(display_name(&"gallery/cats/001.jpg".into()), "001");
        assert_eq!(display_name(&"gallery/cats/002-sleepy-cat.jpg".into()), "sleepy cat");
    }

    // =========================================================================
    // URLs
    // =========================================================================

    #[test]
    fn object_url_encodes_segments() {
        let urls = UrlBuilder::new("https://cdn.example.com/bucket/", "");
        assert_eq!(
            urls.object_url("gallery/my cats/a.jpg"),
            "https://cdn.example.com/bucket/gallery/my%20cats/a.jpg"
        );
    }

    #[test]
    fn thumbnail_route_encodes_whole_key() {
        let urls = UrlBuilder::new("https://cdn.example.com", "");
        assert_eq!(
            urls.thumbnail_route(&"gallery/cats/a.jpg".into()),
            "/thumbnail/gallery%2Fcats%2Fa.jpg"
        );
    }

    #[test]
    fn key_from_object_url() {
        let urls = UrlBuilder::new("https://cdn.example.com/bucket", "");
        let key = urls
            .key_from_reference("https://cdn.example.com/bucket/gallery/my%20cats/a.jpg")
            .unwrap();
        assert_eq!(key.as_str(), "gallery/my cats/a.jpg");
    }

    #[test]
    fn key_from_foreign_url_uses_path() {
        let urls = UrlBuilder::new("https://cdn.example.com/bucket", "");
        let key = urls
            .key_from_reference("https://elsewhere.test/gallery/cats/a.jpg")
            .unwrap();
        assert_eq!(key.as_str(), "gallery/cats/a.jpg");
    }

    #[test]
    fn key_from_raw_key() {
        let urls = UrlBuilder::new("https://cdn.example.com", "");
        assert_eq!(
            urls.key_from_reference("gallery/cats/a.jpg").unwrap().as_str(),
            "gallery/cats/a.jpg"
        );
        assert_eq!(urls.key_from_reference("  "), None);
    }
}
