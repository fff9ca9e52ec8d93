//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end over real HTTP.

use ripple_crawl::config::{parse_config, Config, SeedEntry};
use ripple_crawl::crawler::{ChannelForwarder, Coordinator, Priority};
use ripple_crawl::storage::{MemoryContentStore, SqliteStorage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration; `crawler` lines go into `[crawler]`
fn create_test_config(crawler: &str) -> Config {
    parse_config(&format!(
        r#"
[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[crawler]
workers = 4
default-crawl-delay-ms = 0
retry-backoff-ms = 20
idle-backoff-ms = 20
{}
"#,
        crawler
    ))
    .expect("test config should parse")
}

fn seed(url: String) -> Vec<SeedEntry> {
    vec![SeedEntry {
        url,
        priority: None,
    }]
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

/// Requests for `/` across `servers`
async fn page_hits(servers: &[&MockServer]) -> usize {
    let mut count = 0;
    for server in servers {
        count += server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == "/")
            .count();
    }
    count
}

async fn mount_no_robots(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_single_host() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{}/page1">Page 1</a>
            <a href="/page2?b=2&a=1#top">Page 2</a>
            <a href="mailto:someone@example.com">Mail</a>
            </body></html>"#,
            base
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(r#"<a href="/">Home</a><a href="/page2?a=1&b=2">Page 2</a>"#.to_string()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html("<p>leaf</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let content = Arc::new(MemoryContentStore::new());
    let coordinator = Coordinator::builder(create_test_config(""))
        .content_store(content.clone())
        .build()
        .unwrap();

    coordinator.seed(&seed(format!("{}/", base))).await.unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.fetched, 3);
    assert_eq!(report.stored, 3);
    assert_eq!(report.dropped_terminal, 0);
    assert_eq!(
        content.urls(),
        vec![
            format!("{}/", base),
            format!("{}/page1", base),
            format!("{}/page2?a=1&b=2", base),
        ]
    );
}

#[tokio::test]
async fn test_equivalent_links_collapse_to_one_fetch() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_no_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<a href="/x">x</a><a href="{}/x?">x again</a>"#,
            base
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(html("<p>x</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::builder(create_test_config("")).build().unwrap();
    coordinator.seed(&seed(format!("{}/", base))).await.unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.enqueued, 2);
}

#[tokio::test]
async fn test_robots_disallowed_url_never_requested() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/private/page">Secret</a><a href="/public">Public</a>"#.to_string()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html("<p>public</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(html("<p>secret</p>".to_string()))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = Coordinator::builder(create_test_config("")).build().unwrap();
    coordinator.seed(&seed(format!("{}/", base))).await.unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.dropped_robots, 1);
    assert_eq!(report.fetched, 2);
}

#[tokio::test]
async fn test_timeouts_drop_after_retry_ceiling() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_no_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<p>late</p>".to_string()).set_delay(Duration::from_secs(2)))
        .expect(3)
        .mount(&server)
        .await;

    let coordinator = Coordinator::builder(create_test_config(
        "retry-ceiling = 3\nfetch-timeout-ms = 200",
    ))
    .build()
    .unwrap();
    let frontier = coordinator.frontier().clone();

    coordinator.seed(&seed(format!("{}/slow", base))).await.unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.fetched, 0);
    assert_eq!(report.requeued, 2);
    assert_eq!(report.retries_exhausted, 1);
    assert!(frontier.is_exhausted());
}

#[tokio::test]
async fn test_terminal_responses_are_not_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_no_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/gone">Gone</a><a href="/report.pdf">PDF</a>"#.to_string()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(vec![0x25, 0x50, 0x44, 0x46], "application/pdf"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::builder(create_test_config("")).build().unwrap();
    coordinator.seed(&seed(format!("{}/", base))).await.unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.fetched, 1);
    assert_eq!(report.dropped_terminal, 2);
    assert_eq!(report.requeued, 0);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_no_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html("<p>ok now</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::builder(create_test_config("")).build().unwrap();
    coordinator.seed(&seed(format!("{}/flaky", base))).await.unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.requeued, 1);
    assert_eq!(report.fetched, 1);
}

#[tokio::test]
async fn test_redirects_are_crawled_as_new_urls() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/private/page"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(html("<p>secret</p>".to_string()))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/new", base).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("<p>moved here</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let content = Arc::new(MemoryContentStore::new());
    let coordinator = Coordinator::builder(create_test_config(""))
        .content_store(content.clone())
        .build()
        .unwrap();
    let seeds = vec![
        SeedEntry {
            url: format!("{}/", base),
            priority: None,
        },
        SeedEntry {
            url: format!("{}/old", base),
            priority: None,
        },
    ];
    coordinator.seed(&seeds).await.unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.redirects, 2);
    assert_eq!(report.dropped_robots, 1);
    assert_eq!(report.fetched, 1);
    assert_eq!(content.urls(), vec![format!("{}/new", base)]);
}

#[tokio::test]
async fn test_oversized_body_is_truncated_and_stored() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_no_robots(&server).await;

    let big = format!("<a href=\"/near\">near</a>{}", "x".repeat(10_000));
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(html(big))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/near"))
        .respond_with(html("<p>near</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let content = Arc::new(MemoryContentStore::new());
    let coordinator = Coordinator::builder(create_test_config("max-body-bytes = 1024"))
        .content_store(content.clone())
        .build()
        .unwrap();
    coordinator.seed(&seed(format!("{}/big", base))).await.unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.fetched, 2);
    let stored: Vec<usize> = content
        .documents()
        .into_iter()
        .filter(|doc| doc.url.ends_with("/big"))
        .map(|doc| doc.body.len())
        .collect();
    assert_eq!(stored, vec![1024]);
}

#[tokio::test]
async fn test_crawl_persists_to_sqlite() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_no_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/a">a</a>"#.to_string()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html("<p>a</p>".to_string()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let mut config = create_test_config("");
    config.storage.database_path = Some(db_path.to_string_lossy().into_owned());

    let coordinator = Coordinator::new(config.clone()).unwrap();
    coordinator.seed(&seed(format!("{}/", base))).await.unwrap();
    let report = coordinator.run().await.unwrap();
    assert_eq!(report.stored, 2);

    let storage = SqliteStorage::open(&db_path).unwrap();
    assert_eq!(
        storage.document_urls().unwrap(),
        vec![format!("{}/", base), format!("{}/a", base)]
    );

    // A second run over the same database treats everything as seen
    let rerun = Coordinator::new(config).unwrap();
    let accepted = rerun.seed(&seed(format!("{}/", base))).await.unwrap();
    assert_eq!(accepted, 1);
    let report = rerun.run().await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(report.duplicates, 1);
}

#[tokio::test]
async fn test_two_shards_fetch_each_page_once() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    for server in [&first, &second] {
        mount_no_robots(server).await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html("<p>home</p>".to_string()))
            .expect(1)
            .mount(server)
            .await;
    }

    let peers = vec!["s0".to_string(), "s1".to_string()];
    let (forwarder, mut inboxes) = ChannelForwarder::mesh(&peers, 64);
    let seeds = vec![
        SeedEntry {
            url: format!("{}/", first.uri()),
            priority: Some(Priority::High),
        },
        SeedEntry {
            url: format!("{}/", second.uri()),
            priority: None,
        },
    ];

    let mut runs = Vec::new();
    let mut stops = Vec::new();
    for peer in &peers {
        let config = create_test_config(&format!(
            "\n[shard]\nshard-id = \"{}\"\npeers = [\"s0\", \"s1\"]",
            peer
        ));
        let coordinator = Coordinator::builder(config)
            .forwarder(Arc::new(forwarder.clone()))
            .inbox(inboxes.remove(peer).unwrap())
            .build()
            .unwrap();
        coordinator.seed(&seeds).await.unwrap();
        stops.push(coordinator.stop_handle());
        runs.push(tokio::spawn(coordinator.run()));
    }

    for _ in 0..100 {
        if page_hits(&[&first, &second]).await >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    // Give stray duplicates a chance to show up before stopping
    tokio::time::sleep(Duration::from_millis(200)).await;

    for stop in &stops {
        stop.stop();
    }
    let mut fetched = 0;
    for run in runs {
        fetched += run.await.unwrap().unwrap().fetched;
    }

    assert_eq!(fetched, 2);
    assert_eq!(page_hits(&[&first, &second]).await, 2);
}
