//! Built-in canonicalization rules
use crate::config::HostAliasEntry;
use crate::pipeline::{LinkContext, LinkRule, RuleOutcome};
use crate::url::{normalize_url, NormalizeOptions};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Maximum override hops; the table is cycle-free after validation
const MAX_OVERRIDE_HOPS: usize = 16;

/// Markup captured around a URL by sloppy authoring, as (open, close) pairs
const MARKUP_WRAPPERS: &[(&str, &str)] = &[
    ("<code>", "</code>"),
    ("%3Ccode%3E", "%3C/code%3E"),
    ("&lt;", "&gt;"),
    ("%3C", "%3E"),
    ("<", ">"),
];

/// Strips tag delimiters and entity-escaped angle brackets from link text
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimMarkup;

impl TrimMarkup {
    fn trim(link: &str) -> &str {
        let mut current = link.trim();
        loop {
            let before = current;
            for (open, close) in MARKUP_WRAPPERS {
                if let Some(rest) = strip_prefix_ci(current, open) {
                    current = rest.trim();
                }
                if let Some(rest) = strip_suffix_ci(current, close) {
                    current = rest.trim();
                }
            }
            if current == before {
                return current;
            }
        }
    }
}

impl LinkRule for TrimMarkup {
    fn name(&self) -> &str {
        "trim-markup"
    }

    fn apply(&self, link: &str, _ctx: &LinkContext<'_>) -> RuleOutcome {
        match Self::trim(link) {
            "" => RuleOutcome::Drop,
            trimmed => RuleOutcome::Continue(trimmed.to_string()),
        }
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let start = s.len().checked_sub(suffix.len())?;
    let tail = s.get(start..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..start])
}

/// One alternate host folded onto a canonical host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAlias {
    pub host: String,
    pub target: String,
    /// Synthetic path prefix under which the alias lives on the target
    pub prefix: Option<String>,
}

/// Host aliases with their canonical mapping and its fetch-time inverse
#[derive(Debug, Clone, Default)]
pub struct HostAliasTable {
    aliases: Vec<HostAlias>,
}

impl HostAliasTable {
    pub fn new(aliases: Vec<HostAlias>) -> Self {
        Self { aliases }
    }

    pub fn from_config(entries: &[HostAliasEntry]) -> Self {
        Self::new(
            entries
                .iter()
                .map(|e| HostAlias {
                    host: e.host.to_lowercase(),
                    target: e.target.to_lowercase(),
                    prefix: e.prefix.clone(),
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn is_alias_host(&self, host: &str) -> bool {
        self.aliases.iter().any(|a| a.host.eq_ignore_ascii_case(host))
    }

    /// Maps a URL on an alias host onto its canonical host
    pub fn to_canonical(&self, url: &Url) -> Option<Url> {
        let host = url.host_str()?;
        let alias = self.aliases.iter().find(|a| a.host.eq_ignore_ascii_case(host))?;

        let mut canonical = url.clone();
        canonical.set_host(Some(&alias.target)).ok()?;
        if let Some(prefix) = &alias.prefix {
            canonical.set_path(&format!("{}{}", prefix, url.path()));
        }
        Some(canonical)
    }

    /// Maps a canonical URL under a synthetic prefix back to the host that
    /// actually serves it
    pub fn to_physical(&self, url: &Url) -> Option<Url> {
        let host = url.host_str()?;
        let (alias, rest) = self.aliases.iter().find_map(|a| {
            if !a.target.eq_ignore_ascii_case(host) {
                return None;
            }
            let rest = strip_path_prefix(url.path(), a.prefix.as_deref()?)?;
            Some((a, rest))
        })?;

        let mut physical = url.clone();
        physical.set_host(Some(&alias.host)).ok()?;
        physical.set_path(rest);
        Some(physical)
    }

    /// Prefix of the alias a document on the canonical host lives under
    pub fn prefix_for(&self, url: &Url) -> Option<&str> {
        let host = url.host_str()?;
        self.aliases.iter().find_map(|a| {
            let prefix = a.prefix.as_deref()?;
            (a.target.eq_ignore_ascii_case(host) && strip_path_prefix(url.path(), prefix).is_some())
                .then_some(prefix)
        })
    }
}

/// Returns the remaining path if `path` lies under `prefix`
fn strip_path_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Folds alias hosts onto their canonical host
///
/// Root-relative links inside a document that lives under a synthetic prefix
/// are kept under that prefix.
#[derive(Debug, Clone)]
pub struct HostAliasRule {
    table: Arc<HostAliasTable>,
}

impl HostAliasRule {
    pub fn new(table: Arc<HostAliasTable>) -> Self {
        Self { table }
    }
}

impl LinkRule for HostAliasRule {
    fn name(&self) -> &str {
        "host-alias"
    }

    fn apply(&self, link: &str, ctx: &LinkContext<'_>) -> RuleOutcome {
        if link.starts_with("//") {
            let scheme = ctx.parent.map(|p| p.scheme()).unwrap_or("https");
            if let Ok(url) = Url::parse(&format!("{}:{}", scheme, link)) {
                if let Some(canonical) = self.table.to_canonical(&url) {
                    return RuleOutcome::Continue(canonical.to_string());
                }
            }
            return RuleOutcome::Continue(link.to_string());
        }

        if let Ok(url) = Url::parse(link) {
            return match self.table.to_canonical(&url) {
                Some(canonical) => RuleOutcome::Continue(canonical.to_string()),
                None => RuleOutcome::Continue(link.to_string()),
            };
        }

        if link.starts_with('/') {
            if let Some(prefix) = ctx.parent.and_then(|p| self.table.prefix_for(p)) {
                if strip_path_prefix(link, prefix).is_none() {
                    return RuleOutcome::Continue(format!("{}{}", prefix, link));
                }
            }
        }

        RuleOutcome::Continue(link.to_string())
    }
}

/// Resolves a link against the referring document and normalizes it
#[derive(Debug, Clone)]
pub struct ResolveRule {
    normalize: NormalizeOptions,
}

impl ResolveRule {
    pub fn new(normalize: NormalizeOptions) -> Self {
        Self { normalize }
    }
}

impl LinkRule for ResolveRule {
    fn name(&self) -> &str {
        "resolve"
    }

    fn apply(&self, link: &str, ctx: &LinkContext<'_>) -> RuleOutcome {
        let joined = match ctx.parent {
            Some(parent) => parent.join(link),
            None => Url::parse(link),
        };

        match joined {
            Ok(url) => match normalize_url(url.as_str(), &self.normalize) {
                Ok(url) => RuleOutcome::Continue(url.to_string()),
                Err(_) => RuleOutcome::Drop,
            },
            Err(_) => RuleOutcome::Drop,
        }
    }
}

/// Exact-match replacements for known-broken URLs
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: HashMap<String, String>,
}

impl OverrideTable {
    /// Builds the table with keys and values in canonical form
    pub fn from_config(overrides: &BTreeMap<String, String>, normalize: &NormalizeOptions) -> Self {
        let mut table = Self::default();
        for (from, to) in overrides {
            table.insert(from, to, normalize);
        }
        table
    }

    pub fn insert(&mut self, from: &str, to: &str, normalize: &NormalizeOptions) {
        let canon = |raw: &str| {
            normalize_url(raw, normalize)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| raw.to_string())
        };
        self.entries.insert(canon(from), canon(to));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Follows replacements until the URL is no longer a key
    pub fn apply(&self, mut url: Url) -> Url {
        for _ in 0..MAX_OVERRIDE_HOPS {
            let Some(next) = self.entries.get(url.as_str()) else {
                break;
            };
            match Url::parse(next) {
                Ok(next) => url = next,
                Err(_) => break,
            }
        }
        url
    }
}
