//! End-to-end mirroring against a mock site

use crate::common::{body, host_root, html, mirror, test_config};
use std::fs;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_site_mirrored_with_relative_links() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head>
            <link rel="stylesheet" href="/css/site.css">
            </head><body>
            <a href="/about">About</a>
            <img src="/img/logo.png">
            <a href="https://elsewhere.example/page">External</a>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html(r#"<a href="/">Home</a>"#))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/css/site.css"))
        .respond_with(body(
            "body { background: url('../img/bg.png') }",
            "text/css",
        ))
        .expect(1)
        .mount(&server)
        .await;

    for asset in ["/img/logo.png", "/img/bg.png"] {
        Mock::given(method("GET"))
            .and(path(asset))
            .respond_with(body("PNG", "image/png"))
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = test_config(&[format!("{}/", server.uri())], root.path(), 3);
    let (outcome, reporter) = mirror(&config).await;

    assert_eq!(outcome.completed, 5);
    assert_eq!(outcome.failed, 0);
    assert!(outcome.finished);
    assert_eq!(reporter.completed_records().len(), 5);

    let site = host_root(root.path(), &server);
    let index = fs::read_to_string(site.join("index.html")).unwrap();
    assert!(index.contains(r#"href="css/site.css""#));
    assert!(index.contains(r#"href="about.html""#));
    assert!(index.contains(r#"src="img/logo.png""#));
    assert!(index.contains(r#"href="https://elsewhere.example/page""#));

    let about = fs::read_to_string(site.join("about.html")).unwrap();
    assert!(about.contains(r#"href="index.html""#));

    let css = fs::read_to_string(site.join("css/site.css")).unwrap();
    assert!(css.contains("url('../img/bg.png')"));

    assert_eq!(fs::read(site.join("img/logo.png")).unwrap(), b"PNG");
    assert_eq!(fs::read(site.join("img/bg.png")).unwrap(), b"PNG");
}

#[tokio::test]
async fn test_not_found_reported_separately() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/missing">gone</a><a href="/broken">broken</a>"#))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&[format!("{}/", server.uri())], root.path(), 3);
    let (outcome, reporter) = mirror(&config).await;

    assert_eq!(outcome.completed, 1);
    assert_eq!(outcome.failed, 2);
    assert_eq!(outcome.not_found, 1);
    assert_eq!(outcome.errors, 1);

    let not_found = reporter.not_found_records();
    assert_eq!(not_found.len(), 1);
    assert!(not_found[0].url.ends_with("/missing"));
    assert_eq!(
        not_found[0].referrer.as_deref(),
        Some(format!("{}/", server.uri()).as_str())
    );

    let errors = reporter.error_records();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].url.ends_with("/broken"));
    assert_eq!(errors[0].status_code, Some(500));
}

#[tokio::test]
async fn test_depth_limit_respected() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/a">a</a>"#))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(r#"<a href="/b">b</a>"#))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("too deep"))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config(&[format!("{}/", server.uri())], root.path(), 1);
    let (outcome, _) = mirror(&config).await;

    assert_eq!(outcome.completed, 2);
    let site = host_root(root.path(), &server);
    assert!(site.join("a.html").exists());
    assert!(!site.join("b.html").exists());

    // links past the depth bound still point at where the file would be
    let a = fs::read_to_string(site.join("a.html")).unwrap();
    assert!(a.contains(r#"href="b.html""#));
}

#[tokio::test]
async fn test_redirect_target_not_fetched_twice() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/old">old</a>"#))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html(r#"<a href="/new">self</a>"#))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&[format!("{}/", server.uri())], root.path(), 5);
    let (outcome, _) = mirror(&config).await;

    assert_eq!(outcome.failed, 0);
    let site = host_root(root.path(), &server);
    assert!(site.join("old.html").exists());
    assert!(site.join("new.html").exists());
}

#[tokio::test]
async fn test_sitemap_seed() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();

    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{0}/docs/intro</loc></url>
  <url><loc>{0}/docs/usage</loc></url>
</urlset>"#,
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(body(&sitemap, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;

    for page in ["/docs/intro", "/docs/usage"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(html("<p>docs</p>"))
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = test_config(&[format!("{}/sitemap.xml", server.uri())], root.path(), 1);
    let (outcome, _) = mirror(&config).await;

    assert_eq!(outcome.completed, 3);
    let site = host_root(root.path(), &server);
    assert!(site.join("sitemap.xml").exists());
    assert!(site.join("docs/intro.html").exists());
    assert!(site.join("docs/usage.html").exists());
}
