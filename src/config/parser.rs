use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_mirror::config::load_config;
///
/// let config = load_config(Path::new("mirror.toml")).unwrap();
/// println!("Max depth: {}", config.crawler.max_depth);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded with every run in the report database so runs made with
/// different rule sets can be told apart.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
seeds = ["https://docs.example.com/"]
max-depth = 3
concurrency = 8
adaptive-period-ms = 2000

[mirror]
local-root = "./mirror"
report-database = "./report.db"

[request]
user-agent = "TestMirror/1.0"
headers = { "Accept-Language" = "en-US" }

[[request.cookies]]
url = "https://docs.example.com/"
value = "session=abc"

[rules]
allowed-hosts = ["docs.example.com", "*.cdn.example.com"]
strip-query-params = ["ref"]
html-path-markers = ["/docs/"]

[[rules.host-alias]]
host = "cdn.docs.example.com"
target = "docs.example.com"

[rules.overrides]
"https://docs.example.com/broken" = "https://docs.example.com/fixed"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_depth, 3);
        assert_eq!(config.crawler.concurrency, 8);
        assert_eq!(config.crawler.adaptive_period_ms, Some(2000));
        assert_eq!(config.mirror.local_root, "./mirror");
        assert_eq!(config.request.user_agent, "TestMirror/1.0");
        assert_eq!(config.request.headers.len(), 1);
        assert_eq!(config.request.cookies.len(), 1);
        assert_eq!(config.rules.allowed_hosts.len(), 2);
        assert_eq!(config.rules.host_alias.len(), 1);
        assert_eq!(config.rules.overrides.len(), 1);
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse_config(
            r#"
[crawler]
seeds = ["https://example.com/"]
max-depth = 0
concurrency = 1

[mirror]
local-root = "out"
"#,
        )
        .unwrap();

        assert_eq!(config.request.timeout_secs, 30);
        assert_eq!(config.request.max_redirects, 10);
        assert!(config.request.user_agent.starts_with("sumi-mirror/"));
        assert!(config.rules.binary_extensions.is_none());
        assert!(!config.rules.force_https);
        assert!(config.mirror.report_database.is_none());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
seeds = ["https://example.com/"]
max-depth = 3
concurrency = 0

[mirror]
local-root = "./mirror"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_missing_seeds_is_fatal() {
        let result = parse_config(
            r#"
[crawler]
seeds = []
max-depth = 1
concurrency = 2

[mirror]
local-root = "out"
"#,
        );
        assert!(matches!(result, Err(ConfigError::MissingSeeds)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
