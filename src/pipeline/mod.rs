//! Link canonicalization pipeline and injectable crawl policy
//!
//! A raw link string discovered in a document passes through an ordered chain
//! of [`LinkRule`]s. Each rule may rewrite the link, return a final URL that
//! skips the remaining rules, or veto the link. The surviving string is
//! resolved to an absolute URL, normalized, and finally run through the
//! exact-match override table.
//!
//! # Components
//!
//! - `Pipeline`: the rule chain plus override table
//! - `rules`: built-in rules (markup trimming, host aliasing, resolution)
//! - `Policy`: skip/drop predicates, type detection and fetch-time hooks
//! - `RuleSet`: pipeline and policy assembled from configuration

mod detect;
mod policy;
mod rules;
mod ruleset;

pub use detect::DetectRules;
pub use policy::{
    Decision, DetectFn, DropFn, HtmlHookFn, Policy, PreInitFn, RedirectFilterFn,
    RequestRedirectFn, SkipFn,
};
pub use rules::{HostAlias, HostAliasRule, HostAliasTable, OverrideTable, ResolveRule, TrimMarkup};
pub use ruleset::RuleSet;

use crate::url::{normalize_parsed, NormalizeOptions};
use std::fmt;
use tracing::debug;
use url::Url;

/// Where a link was found
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkContext<'a> {
    /// Canonical URL of the referring document
    pub parent: Option<&'a Url>,

    /// Lowercase name of the element the link came from
    pub tag: Option<&'a str>,
}

impl<'a> LinkContext<'a> {
    pub fn new(parent: Option<&'a Url>, tag: Option<&'a str>) -> Self {
        Self { parent, tag }
    }
}

/// Result of applying one rule to a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Pass the (possibly rewritten) link to the next rule
    Continue(String),
    /// Stop running rules; the link is ready for resolution
    Final(String),
    /// Veto the link
    Drop,
}

/// One step of the canonicalization chain
pub trait LinkRule: Send + Sync {
    /// Name used in debug logs
    fn name(&self) -> &str;

    fn apply(&self, link: &str, ctx: &LinkContext<'_>) -> RuleOutcome;
}

/// A rule backed by a closure
pub struct FnRule<F> {
    name: String,
    f: F,
}

impl<F> FnRule<F>
where
    F: Fn(&str, &LinkContext<'_>) -> RuleOutcome + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> LinkRule for FnRule<F>
where
    F: Fn(&str, &LinkContext<'_>) -> RuleOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, link: &str, ctx: &LinkContext<'_>) -> RuleOutcome {
        (self.f)(link, ctx)
    }
}

/// The ordered canonicalization chain
pub struct Pipeline {
    rules: Vec<Box<dyn LinkRule>>,
    overrides: OverrideTable,
    normalize: NormalizeOptions,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("rules", &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>())
            .field("overrides", &self.overrides.len())
            .field("normalize", &self.normalize)
            .finish()
    }
}

impl Default for Pipeline {
    /// Trim markup artifacts, then resolve against the parent
    fn default() -> Self {
        let normalize = NormalizeOptions::default();
        Self::new(normalize.clone())
            .with_rule(TrimMarkup)
            .with_rule(ResolveRule::new(normalize))
    }
}

impl Pipeline {
    /// Creates an empty chain
    pub fn new(normalize: NormalizeOptions) -> Self {
        Self {
            rules: Vec::new(),
            overrides: OverrideTable::default(),
            normalize,
        }
    }

    /// Appends a rule to the end of the chain
    pub fn with_rule<R: LinkRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn with_overrides(mut self, overrides: OverrideTable) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn normalize_options(&self) -> &NormalizeOptions {
        &self.normalize
    }

    /// Turns a raw link into its canonical absolute URL, or `None` if vetoed
    ///
    /// The override table is consulted after every rule has run, including
    /// when a rule returned a final URL.
    pub fn canonicalize(&self, raw: &str, ctx: &LinkContext<'_>) -> Option<Url> {
        let mut link = raw.to_string();

        for rule in &self.rules {
            match rule.apply(&link, ctx) {
                RuleOutcome::Continue(next) => link = next,
                RuleOutcome::Final(next) => {
                    link = next;
                    break;
                }
                RuleOutcome::Drop => {
                    debug!("Link {:?} vetoed by rule {}", raw, rule.name());
                    return None;
                }
            }
        }

        let resolved = match ctx.parent {
            Some(parent) => parent.join(&link),
            None => Url::parse(&link),
        };

        let url = match resolved.map_err(|e| e.to_string()).and_then(|url| {
            normalize_parsed(url, &self.normalize).map_err(|e| e.to_string())
        }) {
            Ok(url) => url,
            Err(e) => {
                debug!("Link {:?} could not be resolved: {}", raw, e);
                return None;
            }
        };

        let url = self.overrides.apply(url);
        normalize_parsed(url, &self.normalize).ok()
    }
}
