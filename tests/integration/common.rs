//! Shared helpers for the integration tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_mirror::config::{parse_config, Config};
use sumi_mirror::crawler::{crawl, CrawlOutcome};
use sumi_mirror::output::{CollectingReporter, Reporter};
use wiremock::{MockServer, ResponseTemplate};

/// Builds a validated configuration mirroring `seeds` into `root`
pub fn test_config(seeds: &[String], root: &Path, max_depth: u32) -> Config {
    let seeds = seeds
        .iter()
        .map(|s| format!("{:?}", s))
        .collect::<Vec<_>>()
        .join(", ");
    let toml = format!(
        r#"
        [crawler]
        seeds = [{seeds}]
        max-depth = {max_depth}
        concurrency = 4

        [mirror]
        local-root = {root:?}

        [request]
        user-agent = "sumi-mirror-tests"
        timeout-secs = 5
        "#,
        seeds = seeds,
        max_depth = max_depth,
        root = root.display().to_string(),
    );
    parse_config(&toml).expect("test config should be valid")
}

/// Directory the mock server's host is mirrored under
pub fn host_root(root: &Path, server: &MockServer) -> PathBuf {
    let url = url::Url::parse(&server.uri()).expect("mock server URI");
    let host = url.host_str().expect("mock server host");
    match url.port() {
        Some(port) => root.join(format!("{}_{}", host, port)),
        None => root.join(host),
    }
}

/// Runs a crawl to idle, collecting every report record
pub async fn mirror(config: &Config) -> (CrawlOutcome, Arc<CollectingReporter>) {
    let reporter = Arc::new(CollectingReporter::default());
    let sink: Arc<dyn Reporter> = reporter.clone();
    let outcome = crawl(config, sink).await.expect("engine should build");
    (outcome, reporter)
}

/// A 200 response with the given body and content type
pub fn body(content: &str, content_type: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(content.as_bytes().to_vec(), content_type)
}

pub fn html(content: &str) -> ResponseTemplate {
    body(content, "text/html")
}
