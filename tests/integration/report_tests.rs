//! Report ledger populated by a real crawl

use crate::common::{host_root, html, test_config};
use std::sync::{Arc, Mutex};
use sumi_mirror::crawler::engine_from_config;
use sumi_mirror::output::{
    generate_markdown_summary, generate_summary, load_statistics, CollectingReporter,
    FanoutReporter, Reporter, SqliteReporter,
};
use sumi_mirror::storage::{EventKind, ReportStore, RunStatus, SqliteStorage};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_run_recorded_in_report_database() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let db_path = root.path().join("reports/mirror.db");

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/one">1</a><a href="/two">2</a><a href="/gone">x</a>"#,
        ))
        .mount(&server)
        .await;

    for page in ["/one", "/two"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(html(r#"<a href="/gone">x</a>"#))
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&[format!("{}/", server.uri())], root.path(), 3);

    let storage: Arc<Mutex<dyn ReportStore>> =
        Arc::new(Mutex::new(SqliteStorage::new(&db_path).unwrap()));
    let ledger = Arc::new(SqliteReporter::start_run(storage, "hash123").unwrap());
    let collected = Arc::new(CollectingReporter::default());
    let reporter: Arc<dyn Reporter> = Arc::new(
        FanoutReporter::new()
            .with(ledger.clone())
            .with(collected.clone()),
    );

    let engine = engine_from_config(&config, reporter).unwrap();
    let outcome = engine.run().await;

    assert_eq!(outcome.completed, 3);
    assert_eq!(outcome.not_found, 1);
    assert_eq!(collected.outcome(), Some(outcome));

    let reader = SqliteStorage::new(&db_path).unwrap();
    let run = reader.get_run(ledger.run_id()).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "hash123");
    assert_eq!(
        reader
            .count_events(Some(ledger.run_id()), EventKind::Completed)
            .unwrap(),
        3
    );

    let stats = load_statistics(&reader).unwrap();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.not_found, 1);
    assert_eq!(stats.errors, 0);

    let summary = generate_summary(&reader, None).unwrap();
    assert_eq!(summary.run_id, ledger.run_id());
    assert_eq!(summary.top_not_found.len(), 1);
    assert!(summary.top_not_found[0].url.ends_with("/gone"));
    assert!(summary.duration_seconds.is_some());

    let summary_path = root.path().join("summary.md");
    generate_markdown_summary(&summary, &summary_path).unwrap();
    let markdown = std::fs::read_to_string(&summary_path).unwrap();
    assert!(markdown.contains("| Completed | 3 |"));
    assert!(markdown.contains("/gone"));

    assert!(host_root(root.path(), &server).join("one.html").exists());
}
