//! End-to-end ingestion tests: real HTTP (wiremock), real parser, in-memory SQLite.
//!
//! Each test creates its own database and mock server for isolation.

use std::sync::Arc;
use std::time::Duration;

use gator::feed::{FeedError, FeedFetcher, ValidationError};
use gator::ingest::{IngestError, Ingester};
use gator::scheduler::Scheduler;
use gator::storage::Database;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rss(title: &str, slugs: &[&str]) -> String {
    let items: String = slugs
        .iter()
        .enumerate()
        .map(|(i, slug)| {
            format!(
                "<item><title>{title} {slug}</title><link>https://{title}.example.com/{slug}</link>\
                 <description>About {slug}</description>\
                 <pubDate>Mon, 0{day} Jan 2024 10:00:00 +0000</pubDate></item>",
                day = i + 1
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel>
<title>{title}</title><link>https://{title}.example.com</link><description>{title} feed</description>
{items}
</channel></rss>"#
    )
}

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn fetcher() -> FeedFetcher {
    FeedFetcher::new("gator-test", Duration::from_secs(5), 1024 * 1024).unwrap()
}

async fn setup() -> (Database, i64, MockServer) {
    let db = Database::open(":memory:").await.unwrap();
    let user = db.create_user("alice").await.unwrap();
    let server = MockServer::start().await;
    (db, user.id, server)
}

#[tokio::test]
async fn test_feeds_are_polled_round_robin() {
    let (db, uid, server) = setup().await;
    serve(&server, "/alpha.xml", rss("alpha", &["a1", "a2"])).await;
    serve(&server, "/beta.xml", rss("beta", &["b1"])).await;

    let alpha = db
        .create_feed("alpha", &format!("{}/alpha.xml", server.uri()), uid)
        .await
        .unwrap();
    let beta = db
        .create_feed("beta", &format!("{}/beta.xml", server.uri()), uid)
        .await
        .unwrap();

    let ingester = Ingester::new(Arc::new(db.clone()), Arc::new(fetcher()));

    let first = ingester.run_cycle().await.unwrap();
    assert_eq!(first.feed_name.as_deref(), Some("alpha"));
    assert_eq!((first.new_count, first.duplicate_count), (2, 0));

    let second = ingester.run_cycle().await.unwrap();
    assert_eq!(second.feed_name.as_deref(), Some("beta"));
    assert_eq!((second.new_count, second.duplicate_count), (1, 0));

    // Back to alpha: nothing new
    let third = ingester.run_cycle().await.unwrap();
    assert_eq!(third.feed_name.as_deref(), Some("alpha"));
    assert_eq!((third.new_count, third.duplicate_count), (0, 2));

    assert_eq!(db.count_posts_for_feed(alpha.id).await.unwrap(), 2);
    assert_eq!(db.count_posts_for_feed(beta.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_new_items_are_picked_up_on_next_poll() {
    let (db, uid, server) = setup().await;
    let feed = db
        .create_feed("alpha", &format!("{}/alpha.xml", server.uri()), uid)
        .await
        .unwrap();
    let ingester = Ingester::new(Arc::new(db.clone()), Arc::new(fetcher()));

    serve(&server, "/alpha.xml", rss("alpha", &["a1"])).await;
    ingester.run_cycle().await.unwrap();

    server.reset().await;
    serve(&server, "/alpha.xml", rss("alpha", &["a1", "a2", "a3"])).await;
    let summary = ingester.run_cycle().await.unwrap();

    assert_eq!((summary.new_count, summary.duplicate_count), (2, 1));
    assert_eq!(db.count_posts_for_feed(feed.id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_broken_feed_is_skipped_on_next_cycle() {
    let (db, uid, server) = setup().await;
    Mock::given(method("GET"))
        .and(path("/broken.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<rss><channel><title>"))
        .mount(&server)
        .await;
    serve(&server, "/good.xml", rss("good", &["g1"])).await;

    db.create_feed("broken", &format!("{}/broken.xml", server.uri()), uid)
        .await
        .unwrap();
    let good = db
        .create_feed("good", &format!("{}/good.xml", server.uri()), uid)
        .await
        .unwrap();

    let ingester = Ingester::new(Arc::new(db.clone()), Arc::new(fetcher()));

    let err = ingester.run_cycle().await.unwrap_err();
    assert!(matches!(err, IngestError::Feed { ref feed, .. } if feed == "broken"));

    let summary = ingester.run_cycle().await.unwrap();
    assert_eq!(summary.feed_name.as_deref(), Some("good"));
    assert_eq!(db.count_posts_for_feed(good.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_http_error_advances_last_fetched() {
    let (db, uid, server) = setup().await;
    Mock::given(method("GET"))
        .and(path("/gone.xml"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;
    let url = format!("{}/gone.xml", server.uri());
    db.create_feed("gone", &url, uid).await.unwrap();

    let ingester = Ingester::new(Arc::new(db.clone()), Arc::new(fetcher()));
    assert!(ingester.run_cycle().await.is_err());

    let feed = db.get_feed_by_url(&url).await.unwrap().unwrap();
    assert!(feed.last_fetched_at.is_some());
}

#[tokio::test]
async fn test_feed_without_valid_items_fails_validation_and_advances() {
    let (db, uid, server) = setup().await;
    let body = r#"<?xml version="1.0"?><rss version="2.0"><channel>
<title>linkless</title><link>https://linkless.example.com</link><description>No links here</description>
<item><title>One</title><description>first</description></item>
<item><title>Two</title><description>second</description></item>
</channel></rss>"#;
    serve(&server, "/linkless.xml", body.to_string()).await;
    let url = format!("{}/linkless.xml", server.uri());
    let feed = db.create_feed("linkless", &url, uid).await.unwrap();

    let ingester = Ingester::new(Arc::new(db.clone()), Arc::new(fetcher()));
    let err = ingester.run_cycle().await.unwrap_err();
    assert!(
        matches!(
            err,
            IngestError::Feed {
                source: FeedError::Validation(ValidationError::NoValidItems { dropped: 2 }),
                ..
            }
        ),
        "got {err:?}"
    );

    let stored = db.get_feed_by_url(&url).await.unwrap().unwrap();
    assert!(stored.last_fetched_at.is_some());
    assert_eq!(db.count_posts_for_feed(feed.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_scheduler_drives_real_ingestion() {
    let (db, uid, server) = setup().await;
    serve(&server, "/alpha.xml", rss("alpha", &["a1", "a2"])).await;
    serve(&server, "/beta.xml", rss("beta", &["b1", "b2", "b3"])).await;
    let alpha = db
        .create_feed("alpha", &format!("{}/alpha.xml", server.uri()), uid)
        .await
        .unwrap();
    let beta = db
        .create_feed("beta", &format!("{}/beta.xml", server.uri()), uid)
        .await
        .unwrap();

    let ingester = Arc::new(Ingester::new(Arc::new(db.clone()), Arc::new(fetcher())));
    let handle = Scheduler::new(ingester, Duration::from_millis(50)).spawn();

    // Poll until both feeds have been ingested at least once
    for _ in 0..100 {
        if db.count_posts_for_feed(beta.id).await.unwrap() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.shutdown();
    let report = handle.wait().await.unwrap();

    assert!(report.cycles_started >= 2, "report: {report:?}");
    assert_eq!(report.cycles_failed, 0);
    assert_eq!(report.cycles_started, report.cycles_succeeded);
    assert_eq!(db.count_posts_for_feed(alpha.id).await.unwrap(), 2);
    assert_eq!(db.count_posts_for_feed(beta.id).await.unwrap(), 3);
}
