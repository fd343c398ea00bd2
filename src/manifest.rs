//! The gallery manifest shared by the index builder, the server, and clients.
//!
//! Serialised as `gallery-index.json`:
//!
//! ```json
//! {
//!   "gallery": {
//!     "cats": { "name": "cats", "images": [ ... ], "count": 2 },
//!     "dogs": { "name": "dogs", "images": [ ... ], "count": 3 }
//!   },
//!   "total_images": 5,
//!   "generated_at": "2024-05-17T18:42:03Z"
//! }
//! ```
//!
//! Categories keep the order in which the index builder first met them, in
//! memory and on the wire.

use crate::keys::ImageKey;
use crate::metadata::ExifSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default file name of a persisted manifest.
pub const MANIFEST_FILENAME: &str = "gallery-index.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One image as the client sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub key: ImageKey,
    /// Display name from the `NNN-name` convention.
    pub name: String,
    pub filename: String,
    pub extension: String,
    /// Direct URL of the original object.
    pub original: String,
    /// Route that redirects to the preview, generating it on first use.
    pub preview: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exif: Option<ExifSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    /// Display name of the category.
    pub name: String,
    pub images: Vec<ImageDescriptor>,
    pub count: usize,
}

/// Which images a view shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageFilter {
    #[default]
    All,
    Category(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryManifest {
    #[serde(with = "ordered_categories")]
    pub gallery: Vec<(String, CategoryEntry)>,
    pub total_images: usize,
    pub generated_at: DateTime<Utc>,
}

impl Default for GalleryManifest {
    fn default() -> Self {
        Self::empty()
    }
}

impl GalleryManifest {
    pub fn empty() -> Self {
        Self {
            gallery: Vec::new(),
            total_images: 0,
            generated_at: Utc::now(),
        }
    }

    pub fn category(&self, id: &str) -> Option<&CategoryEntry> {
        self.gallery
            .iter()
            .find(|(key, _)| key == id)
            .map(|(_, entry)| entry)
    }

    pub fn category_ids(&self) -> impl Iterator<Item = &str> {
        self.gallery.iter().map(|(key, _)| key.as_str())
    }

    /// Images selected by `filter`, in category order then image order.
    pub fn images(&self, filter: &ImageFilter) -> Vec<&ImageDescriptor> {
        match filter {
            ImageFilter::All => self
                .gallery
                .iter()
                .flat_map(|(_, entry)| entry.images.iter())
                .collect(),
            ImageFilter::Category(id) => self
                .category(id)
                .map(|entry| entry.images.iter().collect())
                .unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the manifest, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// `Vec<(id, entry)>` as a JSON object whose keys keep their order.
mod ordered_categories {
    use super::CategoryEntry;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(entries: &[(String, CategoryEntry)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, entry) in entries {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }

    struct OrderedVisitor;

    impl<'de> Visitor<'de> for OrderedVisitor {
        type Value = Vec<(String, CategoryEntry)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of category id to category")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, entry)) = access.next_entry::<String, CategoryEntry>()? {
                entries.push((key, entry));
            }
            Ok(entries)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, CategoryEntry)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(OrderedVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(category: &str, file: &str) -> ImageDescriptor {
        let key = ImageKey::new(format!("gallery/{category}/{file}"));
        ImageDescriptor {
            name: file.trim_end_matches(".jpg").to_string(),
            filename: file.to_string(),
            extension: "jpg".to_string(),
            original: format!("https://cdn.test/{key}"),
            preview: format!("/thumbnail/{}", urlencoding::encode(key.as_str())),
            category: category.to_string(),
            exif: None,
            key,
        }
    }

    fn entry(category: &str, files: &[&str]) -> (String, CategoryEntry) {
        let images: Vec<_> = files.iter().map(|f| descriptor(category, f)).collect();
        (
            category.to_string(),
            CategoryEntry {
                name: category.to_string(),
                count: images.len(),
                images,
            },
        )
    }

    fn sample() -> GalleryManifest {
        GalleryManifest {
            gallery: vec![
                entry("zebras", &["z1.jpg"]),
                entry("cats", &["a.jpg", "b.jpg"]),
            ],
            total_images: 3,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn categories_serialise_in_insertion_order() {
        let json = sample().to_json().unwrap();
        let zebras = json.find("\"zebras\"").unwrap();
        let cats = json.find("\"cats\"").unwrap();
        assert!(zebras < cats);
    }

    #[test]
    fn deserialise_keeps_document_order() {
        let json = sample().to_json().unwrap();
        let back: GalleryManifest = serde_json::from_str(&json).unwrap();
        let ids: Vec<_> = back.category_ids().collect();
        assert_eq!(ids, vec!["zebras", "cats"]);
        assert_eq!(back.total_images, 3);
    }

    #[test]
    fn wire_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["gallery"]["cats"]["count"], 2);
        assert_eq!(value["gallery"]["cats"]["images"][0]["filename"], "a.jpg");
        assert!(value["gallery"]["cats"]["images"][0].get("exif").is_none());
        assert!(value["generated_at"].is_string());
    }

    #[test]
    fn images_by_filter() {
        let m = sample();
        assert_eq!(m.images(&ImageFilter::All).len(), 3);
        let cats = m.images(&ImageFilter::Category("cats".into()));
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].filename, "a.jpg");
        assert!(m.images(&ImageFilter::Category("owls".into())).is_empty());
    }

    #[test]
    fn save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join(MANIFEST_FILENAME);
        let m = sample();
        m.save(&path).unwrap();
        let loaded = GalleryManifest::load(&path).unwrap();
        assert_eq!(loaded, m);
    }

    #[test]
    fn load_missing_file_errors() {
        let tmp = TempDir::new().unwrap();
        let err = GalleryManifest::load(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Io(_)));
    }
}
