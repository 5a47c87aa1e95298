//! Sumi-Mirror: a website mirroring crawl engine
//!
//! This crate mirrors a website to local disk. Starting from seed URLs it
//! recursively fetches pages and assets, rewrites every discovered link into a
//! canonical, locally-resolvable form, and persists each artifact exactly once.
//!
//! The engine itself knows nothing about any particular site. Site knowledge is
//! supplied through the canonicalization [`pipeline`] and the injectable
//! [`pipeline::Policy`] functions.

pub mod config;
pub mod crawler;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Report error: {0}")]
    Report(#[from] output::OutputError),

    #[error("Processing error for {url}: {message}")]
    Process { url: String, message: String },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::ResourceState,
        to: state::ResourceState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl MirrorError {
    /// Returns true if this error is an HTTP 404 from the fetch collaborator
    pub fn is_not_found(&self) -> bool {
        matches!(self, MirrorError::Fetch(e) if e.is_not_found())
    }

    /// Returns the HTTP status code carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            MirrorError::Fetch(e) => e.status_code(),
            _ => None,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),

    #[error("At least one seed URL is required")]
    MissingSeeds,
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{crawl, CrawlOutcome, Engine, EngineBuilder, EngineOptions, QueueStats};
pub use output::Reporter;
pub use pipeline::{Decision, Pipeline, Policy, RuleSet};
pub use state::{Resource, ResourceKind, ResourceState};
pub use url::{extract_host, normalize_url, NormalizeOptions};
