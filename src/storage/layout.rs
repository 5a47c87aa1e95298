//! Mapping from canonical URLs to files under the mirror root
//!
//! The layout is a pure function of the canonical key, so every reference to
//! a key points at the same file whichever element discovered it, and
//! repeated or concurrent runs converge on the same tree.
use crate::url::host_dir;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Hex digits of the query hash appended to a file stem
const QUERY_HASH_LEN: usize = 8;

/// Longest suffix still treated as a file extension
const MAX_EXTENSION_LEN: usize = 5;

/// File written for a directory-like URL
const INDEX_FILE: &str = "index.html";

/// Computes the local file for a canonical URL
///
/// - `root/host[_port]/decoded/path/segments`
/// - a trailing `/` saves to `index.html`
/// - a last segment without a file extension gets `.html` appended
/// - a query string becomes `_<hash>` at the end of the file stem
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sumi_mirror::storage::save_path;
/// use url::Url;
///
/// let key = Url::parse("https://example.com/docs/").unwrap();
/// let path = save_path(Path::new("/m"), &key);
/// assert_eq!(path, Path::new("/m/example.com/docs/index.html"));
/// ```
pub fn save_path(root: &Path, key: &Url) -> PathBuf {
    let mut path = root.join(host_dir(key).unwrap_or_else(|| "_".to_string()));

    let url_path = key.path();
    let mut segments: Vec<String> = url_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect();

    let file = match segments.pop() {
        Some(last) if !url_path.ends_with('/') => with_html_fallback(last),
        Some(last) => {
            segments.push(last);
            INDEX_FILE.to_string()
        }
        None => INDEX_FILE.to_string(),
    };

    for segment in segments {
        path.push(segment);
    }

    let file = match key.query() {
        Some(query) => with_query_hash(&file, query),
        None => file,
    };

    path.push(file);
    path
}

/// True if `name` ends in something shaped like a file extension
/// (`logo.png`, `site.css`), as opposed to `v1.2` or `README`
fn has_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

fn with_html_fallback(name: String) -> String {
    if has_extension(&name) {
        name
    } else {
        format!("{}.html", name)
    }
}

/// Percent-decodes a path segment and replaces characters unsafe in file names
fn decode_segment(segment: &str) -> String {
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    let sanitized: String = decoded
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match sanitized.as_str() {
        "." | ".." | "" => "_".to_string(),
        _ => sanitized,
    }
}

fn with_query_hash(file: &str, query: &str) -> String {
    let digest = hex::encode(Sha256::digest(query.as_bytes()));
    let hash = &digest[..QUERY_HASH_LEN];

    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, hash, ext),
        _ => format!("{}_{}", file, hash),
    }
}

/// Relative link from the document saved at `from_file` to the file `to_file`
///
/// Each segment is percent-encoded so the result is a valid URL reference.
pub fn relative_link(from_file: &Path, to_file: &Path) -> String {
    let from_dir: Vec<Component<'_>> = from_file
        .parent()
        .map(|p| p.components().collect())
        .unwrap_or_default();
    let to: Vec<Component<'_>> = to_file.components().collect();

    let common = from_dir
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from_dir.len() {
        parts.push("..".to_string());
    }
    for component in &to[common..] {
        let segment = component.as_os_str().to_string_lossy();
        parts.push(urlencoding::encode(&segment).into_owned());
    }

    parts.join("/")
}
