//! Injectable site policy
//!
//! Every site-specific decision the engine makes goes through a named function
//! value held by [`Policy`]. Absent functions have a documented default, so the
//! engine never needs to know which ones a rule set supplied.
use crate::pipeline::{DetectRules, LinkContext};
use crate::state::{Resource, ResourceKind};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Verdict of a skip or drop predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Discard the link or resource
    Drop,
    /// Keep it; later predicates are not consulted
    Keep,
    /// No opinion; ask the next predicate
    Defer,
}

impl Decision {
    /// Folds a chain of decisions: the first non-`Defer` wins, all-`Defer` keeps
    pub fn resolve<I: IntoIterator<Item = Decision>>(decisions: I) -> Decision {
        decisions
            .into_iter()
            .find(|d| *d != Decision::Defer)
            .unwrap_or(Decision::Keep)
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, Decision::Drop)
    }
}

/// Decides whether a raw link is ignored before canonicalization
pub type SkipFn = Arc<dyn Fn(&str, &LinkContext<'_>) -> Decision + Send + Sync>;

/// Classifies a canonical URL given the referring element
pub type DetectFn = Arc<dyn Fn(&Url, Option<&str>) -> ResourceKind + Send + Sync>;

/// Adjusts a freshly built resource before it is offered to the tracker
pub type PreInitFn = Arc<dyn Fn(&mut Resource) + Send + Sync>;

/// Decides whether a fully resolved resource is vetoed
pub type DropFn = Arc<dyn Fn(&Resource) -> Decision + Send + Sync>;

/// Maps a canonical URL to the address actually fetched
pub type RequestRedirectFn = Arc<dyn Fn(&Url) -> Option<Url> + Send + Sync>;

/// Maps the final URL of a redirected fetch to a canonical key, or `None` to
/// ignore the redirect
pub type RedirectFilterFn = Arc<dyn Fn(&Url, &Resource) -> Option<Url> + Send + Sync>;

/// Rewrites an HTML document's text
pub type HtmlHookFn = Arc<dyn Fn(&Resource, String) -> String + Send + Sync>;

/// The full set of injectable policy functions
#[derive(Clone)]
pub struct Policy {
    skip: Vec<SkipFn>,
    detect: DetectFn,
    pre_resource_init: Vec<PreInitFn>,
    drop: Vec<DropFn>,
    request_redirect: Option<RequestRedirectFn>,
    redirect_filter: Option<RedirectFilterFn>,
    pre_process_html: Option<HtmlHookFn>,
    post_process_html: Option<HtmlHookFn>,
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("skip", &self.skip.len())
            .field("pre_resource_init", &self.pre_resource_init.len())
            .field("drop", &self.drop.len())
            .field("request_redirect", &self.request_redirect.is_some())
            .field("redirect_filter", &self.redirect_filter.is_some())
            .field("pre_process_html", &self.pre_process_html.is_some())
            .field("post_process_html", &self.post_process_html.is_some())
            .finish()
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::with_detector(DetectRules::default())
    }
}

impl Policy {
    /// Creates a policy with no predicates and the given detection rules
    pub fn with_detector(rules: DetectRules) -> Self {
        Self {
            skip: Vec::new(),
            detect: Arc::new(move |url: &Url, tag: Option<&str>| rules.detect(url, tag)),
            pre_resource_init: Vec::new(),
            drop: Vec::new(),
            request_redirect: None,
            redirect_filter: None,
            pre_process_html: None,
            post_process_html: None,
        }
    }

    pub fn skip<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &LinkContext<'_>) -> Decision + Send + Sync + 'static,
    {
        self.skip.push(Arc::new(f));
        self
    }

    pub fn detect_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Url, Option<&str>) -> ResourceKind + Send + Sync + 'static,
    {
        self.detect = Arc::new(f);
        self
    }

    pub fn pre_resource_init<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Resource) + Send + Sync + 'static,
    {
        self.pre_resource_init.push(Arc::new(f));
        self
    }

    pub fn drop_resource<F>(mut self, f: F) -> Self
    where
        F: Fn(&Resource) -> Decision + Send + Sync + 'static,
    {
        self.drop.push(Arc::new(f));
        self
    }

    pub fn request_redirect<F>(mut self, f: F) -> Self
    where
        F: Fn(&Url) -> Option<Url> + Send + Sync + 'static,
    {
        self.request_redirect = Some(Arc::new(f));
        self
    }

    pub fn redirect_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Url, &Resource) -> Option<Url> + Send + Sync + 'static,
    {
        self.redirect_filter = Some(Arc::new(f));
        self
    }

    pub fn pre_process_html<F>(mut self, f: F) -> Self
    where
        F: Fn(&Resource, String) -> String + Send + Sync + 'static,
    {
        self.pre_process_html = Some(Arc::new(f));
        self
    }

    pub fn post_process_html<F>(mut self, f: F) -> Self
    where
        F: Fn(&Resource, String) -> String + Send + Sync + 'static,
    {
        self.post_process_html = Some(Arc::new(f));
        self
    }

    /// True if the raw link should be ignored before canonicalization
    pub fn should_skip(&self, raw: &str, ctx: &LinkContext<'_>) -> bool {
        Decision::resolve(self.skip.iter().map(|f| f(raw, ctx))).is_drop()
    }

    /// True if the resolved resource is vetoed
    pub fn should_drop(&self, resource: &Resource) -> bool {
        Decision::resolve(self.drop.iter().map(|f| f(resource))).is_drop()
    }

    pub fn detect(&self, url: &Url, tag: Option<&str>) -> ResourceKind {
        (self.detect)(url, tag)
    }

    pub fn init_resource(&self, resource: &mut Resource) {
        for hook in &self.pre_resource_init {
            hook(resource);
        }
    }

    /// Address to fetch for a canonical URL; the canonical URL itself by default
    pub fn physical_url(&self, key: &Url) -> Url {
        self.request_redirect
            .as_ref()
            .and_then(|f| f(key))
            .unwrap_or_else(|| key.clone())
    }

    /// Canonical key of a redirect target, if the fetch of `resource` landed
    /// somewhere other than its own key
    pub fn canonical_redirect(&self, final_url: &Url, resource: &Resource) -> Option<Url> {
        let canonical = match &self.redirect_filter {
            Some(filter) => filter(final_url, resource)?,
            None => final_url.clone(),
        };
        (canonical != resource.key).then_some(canonical)
    }

    pub fn run_pre_process_html(&self, resource: &Resource, html: String) -> String {
        match &self.pre_process_html {
            Some(hook) => hook(resource, html),
            None => html,
        }
    }

    pub fn run_post_process_html(&self, resource: &Resource, html: String) -> String {
        match &self.post_process_html {
            Some(hook) => hook(resource, html),
            None => html,
        }
    }
}
