use crate::config::RulesConfig;
use crate::UrlError;
use url::Url;

/// Tracking query parameters removed regardless of configuration
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "_ga", "_gl"];

/// Options controlling URL normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Additional query parameters to remove
    pub strip_params: Vec<String>,

    /// Upgrade `http` to `https`
    pub force_https: bool,
}

impl NormalizeOptions {
    /// Builds normalization options from the configured link rules
    pub fn from_rules(rules: &RulesConfig) -> Self {
        Self {
            strip_params: rules.strip_query_params.clone(),
            force_https: rules.force_https,
        }
    }
}

/// Normalizes an absolute URL into its canonical shape
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Optionally upgrade http:// to https://
/// 3. Lowercase the host (done by the parser for http(s))
/// 4. Remove dot segments and collapse repeated slashes, keeping a trailing
///    slash since `/dir/` and `/dir` save to different files
/// 5. Remove fragment
/// 6. Remove tracking and configured query parameters
/// 7. Sort remaining query parameters by key
/// 8. Remove empty query string
///
/// Normalization is idempotent: normalizing a normalized URL returns it unchanged.
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::{normalize_url, NormalizeOptions};
///
/// let url = normalize_url("http://EXAMPLE.COM/a/../b//c/?z=1&a=2#top", &NormalizeOptions::default()).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/b/c/?a=2&z=1");
/// ```
pub fn normalize_url(url_str: &str, options: &NormalizeOptions) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url, options)
}

/// Normalizes an already-parsed URL
pub fn normalize_parsed(mut url: Url, options: &NormalizeOptions) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    if options.force_https && url.scheme() == "http" {
        url.set_scheme("https")
            .map_err(|_| UrlError::Malformed(format!("cannot upgrade scheme of {}", url)))?;
        // set_scheme keeps an explicit :80, which is meaningless under https
        if url.port() == Some(80) {
            let _ = url.set_port(None);
        }
    }

    let normalized_path = normalize_path(url.path());
    if normalized_path != url.path() {
        url.set_path(&normalized_path);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url, options);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Removes dot segments and repeated slashes, preserving a trailing slash
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));

    let last = path.rsplit('/').next().unwrap_or_default();
    if path.ends_with('/') || last == "." || last == ".." {
        result.push('/');
    }

    result
}

/// Filters out tracking and configured parameters and sorts the remainder
fn filter_and_sort_query_params(url: &Url, options: &NormalizeOptions) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_stripped_param(key, options))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

/// Checks if a query parameter should be removed
fn is_stripped_param(key: &str, options: &NormalizeOptions) -> bool {
    TRACKING_PARAMS.contains(&key)
        || key.starts_with("utm_")
        || options.strip_params.iter().any(|p| p == key)
}
