//! Link-type detection from URL shape and referring element
use crate::state::ResourceKind;
use url::Url;

/// Asset extensions that are never parsed for links
const DEFAULT_BINARY_EXTENSIONS: &[&str] = &[
    "css", "gif", "jpg", "jpeg", "js", "jsm", "json", "jar", "png", "svg", "txt", "woff", "woff2",
    "ttf", "otf", "ico", "webp", "xul", "zip", "gz", "mp3", "mp4", "flv", "m4v", "mkv", "msi",
    "xpi", "rdf", "pdf", "webm", "dia", "eot", "psd",
];

/// Elements whose link target is a navigable document
const DOCUMENT_TAGS: &[&str] = &["a", "area", "iframe", "frame"];

/// Deterministic classifier: the same URL and tag always yield the same kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectRules {
    /// Path segments that mark a link as HTML even without an extension
    pub html_path_markers: Vec<String>,
    /// Lowercase extensions (without the dot) treated as opaque assets
    pub binary_extensions: Vec<String>,
}

impl Default for DetectRules {
    fn default() -> Self {
        Self {
            html_path_markers: Vec::new(),
            binary_extensions: DEFAULT_BINARY_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl DetectRules {
    pub fn new(html_path_markers: Vec<String>, binary_extensions: Option<Vec<String>>) -> Self {
        let mut rules = Self {
            html_path_markers,
            ..Self::default()
        };
        if let Some(extensions) = binary_extensions {
            rules.binary_extensions = extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect();
        }
        rules
    }

    /// Classifies a canonical URL found in element `tag`
    ///
    /// - Document elements (`a`, `area`, `iframe`, `frame`): a stylesheet
    ///   extension gives CSS, a sitemap `.xml` gives SiteMap, any other listed
    ///   asset extension gives Binary, and everything else is HTML.
    /// - Other elements, or no element: a stylesheet extension gives CSS, a path
    ///   carrying an HTML marker and no asset extension gives HTML, and
    ///   everything else is Binary.
    pub fn detect(&self, url: &Url, tag: Option<&str>) -> ResourceKind {
        let path = url.path();
        let extension = extension_of(path);

        if extension.as_deref() == Some("css") {
            return ResourceKind::Css;
        }

        let is_asset = extension
            .as_deref()
            .is_some_and(|ext| self.binary_extensions.iter().any(|b| b == ext));

        let is_document_tag = tag.is_some_and(|t| DOCUMENT_TAGS.contains(&t));
        if is_document_tag {
            if is_sitemap_path(path) {
                return ResourceKind::SiteMap;
            }
            return if is_asset {
                ResourceKind::Binary
            } else {
                ResourceKind::Html
            };
        }

        if !is_asset && self.has_html_marker(path) {
            return ResourceKind::Html;
        }

        ResourceKind::Binary
    }

    fn has_html_marker(&self, path: &str) -> bool {
        self.html_path_markers.iter().any(|m| path.contains(m.as_str()))
    }
}

/// Lowercase extension of the last path segment
fn extension_of(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn is_sitemap_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".xml") && lower.contains("sitemap")
}
