use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Sumi-Mirror
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Seed URLs the crawl starts from (depth 0)
    pub seeds: Vec<String>,

    /// Maximum hop count from a seed
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Number of fetch/process/save tasks allowed in flight
    pub concurrency: usize,

    /// Period of the adaptive concurrency adjuster in milliseconds.
    /// Absent or zero disables adaptation.
    #[serde(rename = "adaptive-period-ms", default)]
    pub adaptive_period_ms: Option<u64>,

    /// Lower bound for the adaptive adjuster
    #[serde(rename = "min-concurrency", default = "default_min_concurrency")]
    pub min_concurrency: usize,

    /// Upper bound for the adaptive adjuster
    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Mirror output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Directory the mirrored site is written under
    #[serde(rename = "local-root")]
    pub local_root: String,

    /// Path to the SQLite report database
    #[serde(rename = "report-database", default)]
    pub report_database: Option<String>,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path", default)]
    pub summary_path: Option<String>,
}

/// HTTP request configuration handed to the fetch collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Cookies preloaded into the client's jar
    #[serde(default)]
    pub cookies: Vec<CookieEntry>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            headers: BTreeMap::new(),
            cookies: Vec::new(),
        }
    }
}

/// A cookie scoped to a URL, in `Set-Cookie` syntax
#[derive(Debug, Clone, Deserialize)]
pub struct CookieEntry {
    pub url: String,
    pub value: String,
}

/// Link rules applied by the built-in rule set
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesConfig {
    /// Host patterns that may be mirrored (e.g. "example.com", "*.example.com").
    /// Empty means the seed hosts.
    #[serde(rename = "allowed-hosts", default)]
    pub allowed_hosts: Vec<String>,

    /// Query parameters removed during normalization
    #[serde(rename = "strip-query-params", default)]
    pub strip_query_params: Vec<String>,

    /// Path prefixes skipped before canonicalization
    #[serde(rename = "skip-path-prefixes", default)]
    pub skip_path_prefixes: Vec<String>,

    /// Path prefixes vetoed after canonicalization
    #[serde(rename = "drop-path-prefixes", default)]
    pub drop_path_prefixes: Vec<String>,

    /// Path suffixes vetoed after canonicalization
    #[serde(rename = "drop-path-suffixes", default)]
    pub drop_path_suffixes: Vec<String>,

    /// Path segments that mark a link as HTML regardless of extension
    #[serde(rename = "html-path-markers", default)]
    pub html_path_markers: Vec<String>,

    /// File extensions treated as opaque assets. Absent means the built-in list.
    #[serde(rename = "binary-extensions", default)]
    pub binary_extensions: Option<Vec<String>>,

    /// Upgrade http links to https during normalization
    #[serde(rename = "force-https", default)]
    pub force_https: bool,

    /// Alternate hosts folded onto a canonical host
    #[serde(rename = "host-alias", default)]
    pub host_alias: Vec<HostAliasEntry>,

    /// Exact-match replacements for known-broken URLs
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

/// Maps `host` onto `target`, optionally under a synthetic path prefix
#[derive(Debug, Clone, Deserialize)]
pub struct HostAliasEntry {
    pub host: String,
    pub target: String,
    #[serde(default)]
    pub prefix: Option<String>,
}

fn default_min_concurrency() -> usize {
    1
}

fn default_max_concurrency() -> usize {
    32
}

fn default_user_agent() -> String {
    format!("sumi-mirror/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    10
}
