//! Pipeline and policy assembled from the `[rules]` configuration section
use crate::config::RulesConfig;
use crate::pipeline::{
    Decision, DetectRules, HostAliasRule, HostAliasTable, LinkContext, OverrideTable, Pipeline,
    Policy, ResolveRule, TrimMarkup,
};
use crate::state::Resource;
use crate::url::{extract_host, matches_any, normalize_parsed, NormalizeOptions};
use crate::ConfigError;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Link prefixes that never name a mirrorable resource
const SKIPPED_SCHEMES: &[&str] = &[
    "#",
    "data:",
    "javascript:",
    "mailto:",
    "tel:",
    "about:",
    "chrome:",
    "blob:",
];

/// A configured canonicalization pipeline together with its policy
#[derive(Debug)]
pub struct RuleSet {
    pub pipeline: Pipeline,
    pub policy: Policy,
}

impl RuleSet {
    /// Builds the pipeline and policy described by `rules`
    ///
    /// # Arguments
    ///
    /// * `rules` - The `[rules]` configuration section
    /// * `seeds` - Seed URLs; their hosts are the allowed hosts when none are configured
    ///
    /// # Returns
    ///
    /// * `Ok(RuleSet)` - The assembled rule set
    /// * `Err(ConfigError)` - A seed URL could not be parsed
    pub fn from_config(rules: &RulesConfig, seeds: &[String]) -> Result<Self, ConfigError> {
        let normalize = NormalizeOptions::from_rules(rules);
        let aliases = Arc::new(HostAliasTable::from_config(&rules.host_alias));
        let allowed = Arc::new(allowed_hosts(rules, seeds)?);
        debug!("Allowed hosts: {:?}", allowed);

        let pipeline = Pipeline::new(normalize.clone())
            .with_rule(TrimMarkup)
            .with_rule(HostAliasRule::new(aliases.clone()))
            .with_rule(ResolveRule::new(normalize.clone()))
            .with_overrides(OverrideTable::from_config(&rules.overrides, &normalize));

        let detect = DetectRules::new(
            rules.html_path_markers.clone(),
            rules.binary_extensions.clone(),
        );

        let skip_prefixes = rules.skip_path_prefixes.clone();
        let drop_prefixes = rules.drop_path_prefixes.clone();
        let drop_suffixes = rules.drop_path_suffixes.clone();

        let policy = Policy::with_detector(detect)
            .skip(skip_non_http)
            .skip({
                let allowed = allowed.clone();
                let aliases = aliases.clone();
                move |raw: &str, ctx: &LinkContext<'_>| {
                    match absolute_host(raw, ctx) {
                        Some(host) if !matches_any(allowed.as_slice(), &host) && !aliases.is_alias_host(&host) => {
                            Decision::Drop
                        }
                        _ => Decision::Defer,
                    }
                }
            })
            .skip(move |raw: &str, ctx: &LinkContext<'_>| {
                match raw_path(raw, ctx) {
                    Some(path) if skip_prefixes.iter().any(|p| path.starts_with(p.as_str())) => {
                        Decision::Drop
                    }
                    _ => Decision::Defer,
                }
            })
            .drop_resource({
                let allowed = allowed.clone();
                move |resource: &Resource| match extract_host(&resource.key) {
                    Some(host) if matches_any(allowed.as_slice(), &host) => Decision::Defer,
                    _ => Decision::Drop,
                }
            })
            .drop_resource(move |resource: &Resource| {
                let path = resource.key.path();
                if drop_prefixes.iter().any(|p| path.starts_with(p.as_str()))
                    || drop_suffixes.iter().any(|s| path.ends_with(s.as_str()))
                {
                    Decision::Drop
                } else {
                    Decision::Defer
                }
            })
            .request_redirect({
                let aliases = aliases.clone();
                move |key: &Url| aliases.to_physical(key)
            })
            .redirect_filter(move |final_url: &Url, _resource: &Resource| {
                let mapped = aliases
                    .to_canonical(final_url)
                    .unwrap_or_else(|| final_url.clone());
                let canonical = normalize_parsed(mapped, &normalize).ok()?;
                let host = extract_host(&canonical)?;
                matches_any(allowed.as_slice(), &host).then_some(canonical)
            });

        Ok(Self { pipeline, policy })
    }
}

/// Configured allowed hosts, or the seed hosts, plus every alias target
fn allowed_hosts(rules: &RulesConfig, seeds: &[String]) -> Result<Vec<String>, ConfigError> {
    let mut allowed: Vec<String> = rules
        .allowed_hosts
        .iter()
        .map(|h| h.to_lowercase())
        .collect();

    if allowed.is_empty() {
        for seed in seeds {
            let url = Url::parse(seed)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;
            if let Some(host) = extract_host(&url) {
                allowed.push(host);
            }
        }
    }

    for alias in &rules.host_alias {
        let target = alias.target.to_lowercase();
        if !matches_any(&allowed, &target) {
            allowed.push(target);
        }
    }

    allowed.sort();
    allowed.dedup();
    Ok(allowed)
}

fn skip_non_http(raw: &str, _ctx: &LinkContext<'_>) -> Decision {
    let lower = raw.trim_start().to_ascii_lowercase();
    if lower.is_empty() || SKIPPED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        Decision::Drop
    } else {
        Decision::Defer
    }
}

/// Host of a link that names one explicitly
fn absolute_host(raw: &str, ctx: &LinkContext<'_>) -> Option<String> {
    let raw = raw.trim();
    let url = if raw.starts_with("//") {
        let scheme = ctx.parent.map(|p| p.scheme()).unwrap_or("https");
        Url::parse(&format!("{}:{}", scheme, raw)).ok()?
    } else {
        Url::parse(raw).ok()?
    };
    extract_host(&url)
}

/// Path of a link when it can be known without resolution
fn raw_path(raw: &str, ctx: &LinkContext<'_>) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with('/') && !raw.starts_with("//") {
        let end = raw.find(['?', '#']).unwrap_or(raw.len());
        return Some(raw[..end].to_string());
    }
    if absolute_host(raw, ctx).is_some() {
        let url = Url::parse(raw).ok()?;
        return Some(url.path().to_string());
    }
    None
}
