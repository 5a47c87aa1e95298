//! The unit of crawl work: a URL to mirror plus its fetch and processing state
use crate::state::ResourceState;
use crate::MirrorError;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use url::Url;

/// Closed set of resource kinds; each kind has exactly one content processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Crawlable document; links are extracted and rewritten
    Html,
    /// Stylesheet; `@import` and `url()` references are extracted and rewritten
    Css,
    /// Opaque asset saved verbatim
    Binary,
    /// XML url-set or sitemap index
    SiteMap,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::Binary => "binary",
            Self::SiteMap => "sitemap",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A URL to mirror and everything learned about it while crawling
///
/// The referrer is held as a URL value rather than a pointer to the parent
/// resource, so the resource graph can contain cycles without any ownership
/// edge between resources.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Raw URL as first discovered, before canonicalization
    pub url: String,

    /// Canonical URL; identity for dedup, scheduling and the save path
    pub key: Url,

    /// Canonical URL of the referring resource
    pub referrer: Option<Url>,

    /// Hop count from the nearest seed
    pub depth: u32,

    pub kind: ResourceKind,

    /// Canonical key the fetch was redirected to
    pub redirected: Option<Url>,

    /// Save path of the redirect target, written alongside `save_path`
    pub redirected_save_path: Option<PathBuf>,

    /// Payload for `redirected_save_path`, with links relative to that file;
    /// `None` writes `body` there unchanged
    pub redirected_body: Option<Vec<u8>>,

    /// True if this resource claimed the redirect key in the dedup tracker
    pub owns_redirect: bool,

    /// Fetched, and after processing rewritten, payload
    pub body: Option<Vec<u8>>,

    /// Response content type, if the server sent one
    pub content_type: Option<String>,

    /// Local destination, a pure function of `key`
    pub save_path: PathBuf,

    state: ResourceState,
    saving: bool,
    saved: bool,

    queued_at: Instant,
    pub wait_time: Option<Duration>,
    pub download_time: Option<Duration>,
}

impl Resource {
    /// Creates a queued resource
    pub fn new(
        url: impl Into<String>,
        key: Url,
        kind: ResourceKind,
        depth: u32,
        referrer: Option<Url>,
        save_path: PathBuf,
    ) -> Self {
        Self {
            url: url.into(),
            key,
            referrer,
            depth,
            kind,
            redirected: None,
            redirected_save_path: None,
            redirected_body: None,
            owns_redirect: false,
            body: None,
            content_type: None,
            save_path,
            state: ResourceState::Queued,
            saving: false,
            saved: false,
            queued_at: Instant::now(),
            wait_time: None,
            download_time: None,
        }
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn key_str(&self) -> &str {
        self.key.as_str()
    }

    /// Moves the resource to `next`, rejecting transitions the lifecycle forbids
    pub fn transition(&mut self, next: ResourceState) -> Result<(), MirrorError> {
        if !self.state.can_transition_to(next) {
            return Err(MirrorError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        if self.state == ResourceState::Queued && next == ResourceState::Fetching {
            self.wait_time = Some(self.queued_at.elapsed());
        }

        self.state = next;
        Ok(())
    }

    /// All canonical keys this resource stands for: its own and, when it
    /// claimed one, its redirect target
    pub fn keys(&self) -> Vec<Url> {
        let mut keys = vec![self.key.clone()];
        if self.owns_redirect {
            if let Some(redirected) = &self.redirected {
                keys.push(redirected.clone());
            }
        }
        keys
    }

    /// Claims the save slot. Returns false if a save is running or already done.
    pub fn begin_save(&mut self) -> bool {
        if self.saving || self.saved {
            return false;
        }
        self.saving = true;
        true
    }

    /// Releases the save slot, recording whether the write succeeded
    pub fn finish_save(&mut self, ok: bool) {
        self.saving = false;
        self.saved = ok;
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// True if a failed resource still has something worth writing
    pub fn can_best_effort_save(&self) -> bool {
        self.body.is_some() && !self.saving && !self.saved
    }

    /// Drops the payload to bound memory once the resource is finished
    pub fn release_payload(&mut self) {
        self.body = None;
        self.redirected_body = None;
    }
}
