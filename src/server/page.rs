//! The server-rendered gallery shell served at `/`.
//!
//! The page carries the filter bar, empty column containers and the detail
//! modal. Images are revealed by the browser controller from `/images`; the
//! `noscript` block lists previews for clients without scripting.

use crate::manifest::GalleryManifest;
use maud::{DOCTYPE, Markup, html};

const CSS: &str = r#"
:root { color-scheme: light dark; --gap: 8px; }
body { margin: 0; font-family: system-ui, sans-serif; }
header { display: flex; gap: var(--gap); padding: 12px; flex-wrap: wrap; }
.filter { border: 1px solid currentColor; background: none; padding: 4px 10px; border-radius: 4px; cursor: pointer; }
.filter.active { font-weight: bold; }
.columns { display: flex; gap: var(--gap); padding: 0 var(--gap); align-items: flex-start; }
.column { flex: 1; display: flex; flex-direction: column; gap: var(--gap); }
.column img { width: 100%; display: block; }
#load-more { display: block; margin: 16px auto; }
#detail[hidden] { display: none; }
#detail { position: fixed; inset: 0; background: rgba(0,0,0,.85); display: flex; align-items: center; justify-content: center; }
#detail img { max-width: 90vw; max-height: 80vh; }
#detail img.preview { filter: blur(8px); }
.noscript-grid img { width: 200px; margin: 4px; }
"#;

/// Previews listed for clients without scripting.
const NOSCRIPT_LIMIT: usize = 60;

fn base_document(title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                style { (CSS) }
            }
            body {
                (content)
            }
        }
    }
}

fn filter_bar(manifest: &GalleryManifest) -> Markup {
    html! {
        header {
            nav.filters {
                button.filter.active type="button" data-filter="all" { "All" }
                @for (id, entry) in &manifest.gallery {
                    button.filter type="button" data-filter=(id) {
                        (entry.name) " (" (entry.count) ")"
                    }
                }
            }
        }
    }
}

fn detail_modal() -> Markup {
    html! {
        div id="detail" hidden role="dialog" aria-modal="true" {
            figure {
                img id="detail-image" alt="";
                figcaption id="detail-exif" {}
            }
            button id="detail-close" type="button" aria-label="Close" { "×" }
        }
    }
}

/// Render the gallery page. `app_base_url` prefixes every route the page calls.
pub fn render_gallery(manifest: &GalleryManifest, app_base_url: &str) -> Markup {
    let content = html! {
        (filter_bar(manifest))
        main id="gallery" data-app-base=(app_base_url) data-total=(manifest.total_images) {
            div.columns {}
            button id="load-more" type="button" { "Load more" }
            noscript {
                div.noscript-grid {
                    @for image in manifest.images(&Default::default()).into_iter().take(NOSCRIPT_LIMIT) {
                        a href=(image.original) {
                            img src=(image.preview) alt=(image.name) loading="lazy";
                        }
                    }
                }
            }
        }
        (detail_modal())
    };
    base_document("Gallery", content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use crate::keys::{KeyScheme, UrlBuilder};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn manifest() -> GalleryManifest {
        IndexBuilder::new(
            Arc::new(MemoryStore::new()),
            KeyScheme::new("gallery", "0_preview"),
            UrlBuilder::new("https://cdn.test", ""),
        )
        .build_from_keys(["gallery/cats/a.jpg", "gallery/010-big_dogs/c.jpg"])
    }

    #[test]
    fn page_has_doctype_and_filters() {
        let html = render_gallery(&manifest(), "").into_string();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"data-filter="all""#));
        assert!(html.contains(r#"data-filter="cats""#));
        assert!(html.contains(r#"data-filter="010-big_dogs""#));
        assert!(!html.contains("<script"));
    }

    #[test]
    fn noscript_lists_previews() {
        let html = render_gallery(&manifest(), "").into_string();
        assert!(html.contains("/thumbnail/gallery%2Fcats%2Fa.jpg"));
        assert!(html.contains("https://cdn.test/gallery/cats/a.jpg"));
    }

    #[test]
    fn app_base_is_exposed_without_linking_assets() {
        let html = render_gallery(&manifest(), "/photos").into_string();
        assert!(html.contains(r#"data-app-base="/photos""#));
        assert!(!html.contains("/static/"));
    }
}
