use crate::config::types::{Config, CrawlerConfig, HostAliasEntry, MirrorConfig, RequestConfig, RulesConfig};
use crate::url::{normalize_url, NormalizeOptions};
use crate::ConfigError;
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Upper bound on configured concurrency
const MAX_CONCURRENCY: usize = 256;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_mirror_config(&config.mirror)?;
    validate_request_config(&config.request)?;
    validate_rules_config(&config.rules)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.seeds.is_empty() {
        return Err(ConfigError::MissingSeeds);
    }

    for seed in &config.seeds {
        validate_http_url(seed, "seed URL")?;
    }

    if config.concurrency < 1 || config.concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency
        )));
    }

    if config.adaptive_period_ms.unwrap_or(0) > 0 {
        if config.min_concurrency < 1 {
            return Err(ConfigError::Validation(
                "min_concurrency must be >= 1".to_string(),
            ));
        }
        if config.min_concurrency > config.max_concurrency {
            return Err(ConfigError::Validation(format!(
                "min_concurrency ({}) cannot exceed max_concurrency ({})",
                config.min_concurrency, config.max_concurrency
            )));
        }
    }

    Ok(())
}

/// Validates mirror output configuration
fn validate_mirror_config(config: &MirrorConfig) -> Result<(), ConfigError> {
    if config.local_root.trim().is_empty() {
        return Err(ConfigError::Validation(
            "local_root cannot be empty".to_string(),
        ));
    }

    if matches!(&config.report_database, Some(p) if p.is_empty()) {
        return Err(ConfigError::Validation(
            "report_database cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates request configuration
fn validate_request_config(config: &RequestConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    for cookie in &config.cookies {
        validate_http_url(&cookie.url, "cookie URL")?;
    }

    Ok(())
}

/// Validates link rules
fn validate_rules_config(rules: &RulesConfig) -> Result<(), ConfigError> {
    for pattern in &rules.allowed_hosts {
        validate_host_pattern(pattern)?;
    }

    validate_host_aliases(&rules.host_alias)?;
    validate_overrides(rules)?;

    Ok(())
}

/// Validates host alias entries
fn validate_host_aliases(aliases: &[HostAliasEntry]) -> Result<(), ConfigError> {
    let alias_hosts: HashSet<String> = aliases.iter().map(|a| a.host.to_lowercase()).collect();

    for alias in aliases {
        validate_host_pattern(&alias.host)?;
        validate_host_pattern(&alias.target)?;

        if alias.host.eq_ignore_ascii_case(&alias.target) {
            return Err(ConfigError::Validation(format!(
                "host alias '{}' cannot target itself",
                alias.host
            )));
        }

        if alias_hosts.contains(&alias.target.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "host alias target '{}' is itself an alias",
                alias.target
            )));
        }

        if let Some(prefix) = &alias.prefix {
            if !prefix.starts_with('/') || prefix.ends_with('/') || prefix.len() < 2 {
                return Err(ConfigError::Validation(format!(
                    "host alias prefix '{}' must start with '/' and not end with '/'",
                    prefix
                )));
            }
        }
    }

    Ok(())
}

/// Validates the override table: every entry is an absolute URL and following
/// replacements always terminates
fn validate_overrides(rules: &RulesConfig) -> Result<(), ConfigError> {
    let options = NormalizeOptions::from_rules(rules);
    let mut table = BTreeMap::new();

    for (from, to) in &rules.overrides {
        let from = normalize_override(from, &options)?;
        let to = normalize_override(to, &options)?;
        table.insert(from, to);
    }

    for start in table.keys() {
        let mut seen = HashSet::new();
        let mut current = start;
        while let Some(next) = table.get(current) {
            if !seen.insert(current) {
                return Err(ConfigError::Validation(format!(
                    "override table contains a cycle through '{}'",
                    start
                )));
            }
            current = next;
        }
    }

    Ok(())
}

fn normalize_override(raw: &str, options: &NormalizeOptions) -> Result<String, ConfigError> {
    let url = validate_http_url(raw, "override URL")?;
    normalize_url(url.as_str(), options)
        .map(|u| u.to_string())
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid override URL '{}': {}", raw, e)))
}

/// Validates that a string is an absolute http(s) URL
fn validate_http_url(raw: &str, what: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, raw
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            what, raw
        )));
    }

    Ok(url)
}

/// Validates a host pattern (supports a leading `*.` wildcard)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(host) => validate_host_string(host),
        None => validate_host_string(pattern),
    }
}

/// Validates a host string (without wildcard prefix)
fn validate_host_string(host: &str) -> Result<(), ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host cannot be empty".to_string(),
        ));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot start or end with '.' or '-'",
            host
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot contain consecutive dots",
            host
        )));
    }

    if !host.contains('.') && host != "localhost" {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' must contain at least one dot (e.g., 'example.com')",
            host
        )));
    }

    Ok(())
}
