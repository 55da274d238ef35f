// tests/discovery.rs
//
// Discovery agent against scripted feeds:
// - exact-duplicate collapse across sources (occurrence counting)
// - freshness filtering
// - source health: degrade, pause, skip during cool-down, probe
// - request spacing per source, also under concurrent runs
// - article page text and single-url scraping

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use aec_news_pipeline::backoff::Backoff;
use aec_news_pipeline::health::{HealthState, HealthThresholds};
use aec_news_pipeline::model::{ItemStatus, Source};
use aec_news_pipeline::scout::fetch::FeedFetcher;
use aec_news_pipeline::scout::{ScoutAgent, ScoutConfig, MANUAL_SOURCE_ID};
use aec_news_pipeline::sources::SourceRegistry;
use aec_news_pipeline::store::{ContentStore, MemoryStore};
use aec_news_pipeline::{PipelineError, Result};

/// Serves documents by URL and records every call; unknown URLs fail.
#[derive(Default)]
struct ScriptedFetcher {
    docs: HashMap<String, String>,
    calls: Mutex<Vec<(String, Instant)>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    fn with(mut self, url: &str, doc: String) -> Self {
        self.docs.insert(url.to_string(), doc);
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls_to(&self, url: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, t)| *t)
            .collect()
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch(&self, source_id: &str, url: &str) -> Result<String> {
        self.calls.lock().push((url.to_string(), Instant::now()));
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.docs
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::TransientSource {
                source_id: source_id.to_string(),
                message: "connection refused".into(),
            })
    }
}

fn rss(items: &[(&str, &str, DateTime<Utc>)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, link, at)| {
            format!(
                "<item><title>{title}</title><link>{link}</link><pubDate>{}</pubDate>\
                 <description>AI for construction and BIM workflows.</description></item>",
                at.to_rfc2822()
            )
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>{body}</channel></rss>"#)
}

fn scout_config(attempts: u32) -> ScoutConfig {
    ScoutConfig {
        max_concurrent_sources: 3,
        max_items_per_source: 10,
        freshness_window: Duration::from_secs(48 * 3600),
        poll_attempts_per_call: attempts,
        poll_timeout: Duration::from_secs(5),
        poll_backoff: Backoff::new(Duration::from_millis(100), Duration::from_secs(1)),
        dedup_window_capacity: 1_000,
        fetch_article_bodies: false,
        max_concurrent_article_fetches: 2,
    }
}

fn setup(
    sources: &[(&str, &str, u64)],
    fetcher: ScriptedFetcher,
    attempts: u32,
) -> (ScoutAgent, Arc<ScriptedFetcher>, Arc<MemoryStore>) {
    setup_with(sources, fetcher, scout_config(attempts))
}

fn setup_with(
    sources: &[(&str, &str, u64)],
    fetcher: ScriptedFetcher,
    cfg: ScoutConfig,
) -> (ScoutAgent, Arc<ScriptedFetcher>, Arc<MemoryStore>) {
    let registry = Arc::new(SourceRegistry::new(
        HealthThresholds::new(3, 2, 2),
        Duration::from_secs(60),
    ));
    for (id, url, interval_ms) in sources {
        registry.register(Source::new(*id, *url, None, 0.7, *interval_ms));
    }
    let fetcher = Arc::new(fetcher);
    let store = Arc::new(MemoryStore::new());
    let scout = ScoutAgent::new(
        cfg,
        registry,
        fetcher.clone(),
        store.clone(),
    );
    (scout, fetcher, store)
}

#[tokio::test]
async fn identical_item_from_two_sources_is_one_item_seen_twice() {
    let now = Utc::now();
    let shared = ("Robots reshape site logistics", "https://news.test/robots?utm_source=a", now);
    let fetcher = ScriptedFetcher::default()
        .with("https://a.test/rss", rss(&[shared]))
        .with(
            "https://b.test/rss",
            rss(&[("  Robots   reshape site LOGISTICS ", "https://NEWS.test/robots", now)]),
        )
        .with(
            "https://c.test/rss",
            rss(&[("Digital twins for tunnels", "https://news.test/twins", now)]),
        );
    let (scout, _, store) = setup(
        &[
            ("a", "https://a.test/rss", 0),
            ("b", "https://b.test/rss", 0),
            ("c", "https://c.test/rss", 0),
        ],
        fetcher,
        1,
    );

    let items = scout.run(&[]).await.expect("discovery run");
    assert_eq!(items.len(), 2, "duplicate collapses into one item");

    let robots = items
        .iter()
        .find(|i| i.title.starts_with("Robots"))
        .expect("robots item");
    assert_eq!(robots.occurrences, 2);
    assert_eq!(store.item_count(), 2);
    let stored = store.get_item(&robots.id).await.unwrap().unwrap();
    assert_eq!(stored.occurrences, 2);
}

#[tokio::test]
async fn repeat_run_yields_nothing_new() {
    let now = Utc::now();
    let fetcher = ScriptedFetcher::default().with(
        "https://a.test/rss",
        rss(&[("Parametric facades", "https://news.test/facades", now)]),
    );
    let (scout, _, store) = setup(&[("a", "https://a.test/rss", 0)], fetcher, 1);

    assert_eq!(scout.run(&[]).await.unwrap().len(), 1);
    assert!(scout.run(&[]).await.unwrap().is_empty());
    let all = store
        .items_by_status(aec_news_pipeline::model::ItemStatus::Discovered)
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].occurrences, 2);
}

#[tokio::test]
async fn items_outside_freshness_window_are_dropped() {
    let now = Utc::now();
    let fetcher = ScriptedFetcher::default().with(
        "https://a.test/rss",
        rss(&[
            ("Fresh story", "https://news.test/fresh", now - ChronoDuration::hours(2)),
            ("Old story", "https://news.test/old", now - ChronoDuration::days(3)),
        ]),
    );
    let (scout, _, _) = setup(&[("a", "https://a.test/rss", 0)], fetcher, 1);

    let items = scout.run(&[]).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Fresh story");
}

#[tokio::test(start_paused = true)]
async fn five_consecutive_failures_pause_source_until_cooldown() {
    let now = Utc::now();
    let fetcher = ScriptedFetcher::default().with(
        "https://ok.test/rss",
        rss(&[("Smart building sensors", "https://news.test/sensors", now)]),
    );
    let (scout, fetcher, _) = setup(
        &[("ok", "https://ok.test/rss", 0), ("down", "https://down.test/rss", 0)],
        fetcher,
        1,
    );
    let down = scout.registry().get("down").unwrap();

    for run in 1..=5 {
        let items = scout.run(&[]).await.unwrap();
        // The healthy source is never affected by the failing one.
        assert!(run > 1 || items.len() == 1);
        let expected = match run {
            1 | 2 => HealthState::Healthy,
            3 | 4 => HealthState::Degraded,
            _ => HealthState::Paused,
        };
        assert_eq!(down.health(), expected, "after run {run}");
    }
    assert_eq!(fetcher.calls_to("https://down.test/rss").len(), 5);

    // Cool-down running: skipped entirely.
    scout.run(&[]).await.unwrap();
    assert_eq!(fetcher.calls_to("https://down.test/rss").len(), 5);

    // Cool-down over: exactly one probe attempt.
    tokio::time::advance(Duration::from_secs(61)).await;
    scout.run(&[]).await.unwrap();
    assert_eq!(fetcher.calls_to("https://down.test/rss").len(), 6);
    assert_eq!(down.health(), HealthState::Paused);

    let snap = down.snapshot();
    assert_eq!(snap.consecutive_failures, 6);
    assert_eq!(snap.success_rate, 0.0);
    assert!(snap.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn failed_poll_retries_within_one_call() {
    let (scout, fetcher, store) =
        setup(&[("down", "https://down.test/rss", 0)], ScriptedFetcher::default(), 3);

    assert!(scout.run(&[]).await.unwrap().is_empty());
    let calls = fetcher.calls_to("https://down.test/rss");
    assert_eq!(calls.len(), 3);
    assert!(calls.windows(2).all(|w| w[1] > w[0]), "retries are backed off");
    assert_eq!(
        scout.registry().get("down").unwrap().health(),
        HealthState::Degraded
    );
    // Snapshot persisted after the poll.
    let persisted = store.list_sources().await.unwrap();
    assert_eq!(persisted[0].consecutive_failures, 3);
}

#[tokio::test(start_paused = true)]
async fn consecutive_polls_respect_min_request_interval() {
    let now = Utc::now();
    let fetcher = ScriptedFetcher::default().with(
        "https://slow.test/rss",
        rss(&[("Carbon accounting", "https://news.test/carbon", now)]),
    );
    let (scout, fetcher, _) = setup(&[("slow", "https://slow.test/rss", 2_000)], fetcher, 1);

    for _ in 0..3 {
        scout.run(&[]).await.unwrap();
    }
    let calls = fetcher.calls_to("https://slow.test/rss");
    assert_eq!(calls.len(), 3, "early polls are deferred, not skipped");
    for w in calls.windows(2) {
        assert!(w[1] - w[0] >= Duration::from_millis(2_000));
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_poll_one_source_one_at_a_time() {
    let now = Utc::now();
    let fetcher = ScriptedFetcher::default()
        .with(
            "https://busy.test/rss",
            rss(&[("Carbon accounting", "https://news.test/carbon", now)]),
        )
        .delayed(Duration::from_millis(500));
    let (scout, fetcher, store) = setup(&[("busy", "https://busy.test/rss", 2_000)], fetcher, 1);

    let (a, b) = tokio::join!(scout.run(&[]), scout.run(&[]));
    assert_eq!(a.unwrap().len() + b.unwrap().len(), 1);

    assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 1);
    let calls = fetcher.calls_to("https://busy.test/rss");
    assert_eq!(calls.len(), 2);
    assert!(calls[1] - calls[0] >= Duration::from_millis(2_000));

    let stored = store.items_by_status(ItemStatus::Discovered).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].occurrences, 2);
}

const ARTICLE_PAGE: &str = r#"<html><head><title>Layout robots | News</title>
    <meta property="og:title" content="Layout robots mark slabs from BIM"></head>
    <body><nav>Home</nav><article><h1>Layout robots mark slabs from BIM</h1>
    <p>General contractors are deploying layout robots that read BIM coordinates
    and print wall lines directly onto concrete slabs, cutting survey crews' time.</p>
    </article><footer>Subscribe</footer></body></html>"#;

#[tokio::test]
async fn article_page_text_replaces_feed_teaser() {
    let now = Utc::now();
    let fetcher = ScriptedFetcher::default()
        .with(
            "https://a.test/rss",
            rss(&[
                ("Layout robots mark slabs", "https://news.test/robots", now),
                ("Paywalled story", "https://news.test/paywalled", now),
            ]),
        )
        .with("https://news.test/robots", ARTICLE_PAGE.to_string());
    let cfg = ScoutConfig {
        fetch_article_bodies: true,
        ..scout_config(1)
    };
    let (scout, fetcher, _) = setup_with(&[("a", "https://a.test/rss", 0)], fetcher, cfg);

    let items = scout.run(&[]).await.unwrap();
    assert_eq!(items.len(), 2);
    let robots = items.iter().find(|it| it.url.ends_with("/robots")).unwrap();
    assert!(robots.body.starts_with("Layout robots mark slabs from BIM General contractors"));
    assert!(!robots.body.contains("Subscribe"));
    let paywalled = items.iter().find(|it| it.url.ends_with("/paywalled")).unwrap();
    assert_eq!(paywalled.body, "AI for construction and BIM workflows.");

    // A second run sees both as repeats and fetches no article pages.
    scout.run(&[]).await.unwrap();
    assert_eq!(fetcher.calls_to("https://news.test/robots").len(), 1);
    assert_eq!(
        scout.registry().get("a").unwrap().health(),
        HealthState::Healthy
    );
}

#[tokio::test]
async fn single_url_scrape_admits_page_once() {
    let fetcher = ScriptedFetcher::default()
        .with("https://news.test/robots", ARTICLE_PAGE.to_string());
    let (scout, _, store) = setup(&[], fetcher, 1);

    let item = scout
        .scrape_url("https://news.test/robots")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.source_id, MANUAL_SOURCE_ID);
    assert_eq!(item.title, "Layout robots mark slabs from BIM");
    assert!(item.body.contains("print wall lines"));

    assert!(scout.scrape_url("https://news.test/robots").await.unwrap().is_none());
    let stored = store.get_item(&item.id).await.unwrap().unwrap();
    assert_eq!(stored.occurrences, 2);

    let err = scout.scrape_url("https://news.test/missing").await.unwrap_err();
    assert!(err.is_retryable());
}
