//! Discovery agent.
//!
//! `discover` returns a lazy stream: sources are polled under a concurrency
//! limit as the stream is consumed, parsed entries are freshness-filtered, and
//! each candidate is admitted through the dedup window and the store. Only
//! first sightings are yielded; repeats bump the stored occurrence counter.
//! New entries get the article page text as body when it beats the feed teaser.

pub mod article;
pub mod dedup;
pub mod feed;
pub mod fetch;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::backoff::Backoff;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::health::HealthState;
use crate::metrics::{
    ARTICLE_BODIES, ITEMS_DISCOVERED, ITEMS_DUPLICATE, ITEMS_STALE, LAST_DISCOVERY_TS, POLL_FAILURES,
    POLL_LATENCY_MS, SOURCES_SKIPPED,
};
use crate::model::{AgentType, ContentItem, TaskOutput, TaskPayload};
use crate::orchestrator::registry::AgentHandler;
use crate::sources::{PollGate, SourceEntry, SourceRegistry};
use crate::store::{ContentStore, InsertOutcome};

use article::ExtractedArticle;
use dedup::DedupWindow;
use feed::ParsedFeed;
use fetch::FeedFetcher;

#[derive(Debug, Clone)]
pub struct ScoutConfig {
    pub max_concurrent_sources: usize,
    pub max_items_per_source: usize,
    pub freshness_window: Duration,
    pub poll_attempts_per_call: u32,
    pub poll_timeout: Duration,
    pub poll_backoff: Backoff,
    pub dedup_window_capacity: usize,
    pub fetch_article_bodies: bool,
    pub max_concurrent_article_fetches: usize,
}

impl From<&PipelineConfig> for ScoutConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            max_concurrent_sources: cfg.max_concurrent_sources.max(1),
            max_items_per_source: cfg.max_items_per_source,
            freshness_window: cfg.freshness_window(),
            poll_attempts_per_call: cfg.poll_attempts_per_call.max(1),
            poll_timeout: cfg.poll_timeout(),
            poll_backoff: Backoff::new(cfg.poll_backoff_base(), cfg.backoff_cap()),
            dedup_window_capacity: cfg.dedup_window_capacity,
            fetch_article_bodies: cfg.fetch_article_bodies,
            max_concurrent_article_fetches: cfg.max_concurrent_article_fetches.max(1),
        }
    }
}

/// Source id for items scraped on request rather than polled from a feed.
pub const MANUAL_SOURCE_ID: &str = "manual";

pub struct ScoutAgent {
    cfg: ScoutConfig,
    registry: Arc<SourceRegistry>,
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<dyn ContentStore>,
    window: Mutex<DedupWindow>,
}

impl ScoutAgent {
    pub fn new(
        cfg: ScoutConfig,
        registry: Arc<SourceRegistry>,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        crate::metrics::ensure_metrics_described();
        let window = Mutex::new(DedupWindow::new(
            cfg.freshness_window,
            cfg.dedup_window_capacity,
        ));
        Self {
            cfg,
            registry,
            fetcher,
            store,
            window,
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Lazily poll `source_ids` (every registered source when empty) and yield new items.
    ///
    /// Unknown ids are ignored. Each call is an independent run.
    pub fn discover<'a>(&'a self, source_ids: &[String]) -> BoxStream<'a, ContentItem> {
        let ids = if source_ids.is_empty() {
            self.registry.ids()
        } else {
            source_ids.to_vec()
        };
        let entries: Vec<Arc<SourceEntry>> = ids
            .iter()
            .filter_map(|id| {
                let e = self.registry.get(id);
                if e.is_none() {
                    tracing::warn!(target: "scout", source_id = %id, "unknown source requested");
                }
                e
            })
            .collect();

        stream::iter(entries)
            .map(move |entry| self.poll_source(entry))
            .buffer_unordered(self.cfg.max_concurrent_sources)
            .flat_map(stream::iter)
            .filter_map(move |item| self.admit(item))
            .boxed()
    }

    /// Drain one discovery run and return the new items as currently stored.
    pub async fn run(&self, source_ids: &[String]) -> Result<Vec<ContentItem>> {
        let started = Instant::now();
        let ids: Vec<String> = self
            .discover(source_ids)
            .map(|it| it.id)
            .collect()
            .await;
        let items = self.store.get_items(&ids).await?;
        gauge!(LAST_DISCOVERY_TS).set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "scout",
            new_items = items.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "discovery run finished"
        );
        Ok(items)
    }

    /// Poll one source with rate limiting and per-call retries.
    /// Failures are absorbed here; the stream only sees items.
    async fn poll_source(&self, entry: Arc<SourceEntry>) -> Vec<ContentItem> {
        let _poll = entry.lock_poll().await;
        let source_id = entry.source_id();
        let url = entry.url();

        let attempts = match entry.gate(Instant::now()) {
            PollGate::Skip => {
                counter!(SOURCES_SKIPPED).increment(1);
                tracing::debug!(target: "scout", source_id = %source_id, "source paused, skipping");
                return Vec::new();
            }
            PollGate::Probe => {
                tracing::info!(target: "scout", source_id = %source_id, "probing paused source");
                1
            }
            PollGate::Normal => self.cfg.poll_attempts_per_call,
        };

        let mut items = Vec::new();
        for attempt in 0..attempts {
            let slot = entry.reserve_slot(Instant::now());
            tokio::time::sleep_until(slot).await;

            let started = Instant::now();
            let res = self.fetch_and_parse(&source_id, &url).await;
            let latency = started.elapsed();
            histogram!(POLL_LATENCY_MS).record(latency.as_secs_f64() * 1_000.0);

            match res {
                Ok(parsed) => {
                    items = self.fresh_items(&source_id, parsed);
                    entry.record_success(latency, items.len(), Utc::now(), Instant::now());
                    break;
                }
                Err(e) => {
                    counter!(POLL_FAILURES, "kind" => e.kind()).increment(1);
                    entry.record_failure(&e.to_string(), latency, Utc::now(), Instant::now());
                    tracing::warn!(
                        target: "scout",
                        source_id = %source_id,
                        attempt = attempt + 1,
                        error = %e,
                        "poll failed"
                    );
                    let last = attempt + 1 == attempts;
                    if last || !e.is_retryable() || entry.health() == HealthState::Paused {
                        break;
                    }
                    tokio::time::sleep(self.cfg.poll_backoff.delay(attempt)).await;
                }
            }
        }

        if let Err(e) = self.store.put_source(entry.snapshot()).await {
            tracing::warn!(target: "scout", source_id = %source_id, error = %e, "source snapshot not persisted");
        }
        if self.cfg.fetch_article_bodies && !items.is_empty() {
            items = self.with_article_bodies(&source_id, items).await;
        }
        items
    }

    /// Swap each unseen item's teaser for its article text when that is longer.
    /// Article failures never touch source health; the teaser stays.
    async fn with_article_bodies(
        &self,
        source_id: &str,
        items: Vec<ContentItem>,
    ) -> Vec<ContentItem> {
        let now = Instant::now();
        stream::iter(items)
            .map(|mut item| async move {
                let seen = self.window.lock().contains(&item.dedup_hash, now);
                if seen {
                    return item;
                }
                match self.fetch_article(source_id, &item.url).await {
                    Ok(article) if article.text.chars().count() > item.body.chars().count() => {
                        counter!(ARTICLE_BODIES, "outcome" => "extracted").increment(1);
                        item.body = article.text;
                    }
                    Ok(_) => {
                        counter!(ARTICLE_BODIES, "outcome" => "fallback").increment(1);
                    }
                    Err(e) => {
                        counter!(ARTICLE_BODIES, "outcome" => "fallback").increment(1);
                        tracing::debug!(target: "scout", url = %item.url, error = %e, "article text unavailable, keeping feed summary");
                    }
                }
                item
            })
            .buffered(self.cfg.max_concurrent_article_fetches)
            .collect()
            .await
    }

    async fn fetch_article(&self, source_id: &str, url: &str) -> Result<ExtractedArticle> {
        let html = match tokio::time::timeout(
            self.cfg.poll_timeout,
            self.fetcher.fetch_article(source_id, url),
        )
        .await
        {
            Ok(r) => r?,
            Err(_) => {
                return Err(PipelineError::TransientSource {
                    source_id: source_id.to_string(),
                    message: format!("article fetch timed out after {}ms", self.cfg.poll_timeout.as_millis()),
                })
            }
        };
        article::extract_article(&html).ok_or_else(|| PipelineError::Parse {
            source_id: source_id.to_string(),
            message: format!("no readable text at {url}"),
        })
    }

    /// Scrape a single article page and admit it as a discovered item.
    /// `None` when the page is already known.
    pub async fn scrape_url(&self, url: &str) -> Result<Option<ContentItem>> {
        let url = url.trim();
        let article = self.fetch_article(MANUAL_SOURCE_ID, url).await?;
        let now = Utc::now();
        let title = article.title.unwrap_or_else(|| url.to_string());
        let item = ContentItem::discovered(MANUAL_SOURCE_ID, url, title, article.text, now, now);
        let admitted = self.admit(item).await;
        if let Some(it) = &admitted {
            tracing::info!(target: "scout", item_id = %it.id, url, "scraped article admitted");
        }
        Ok(admitted)
    }

    async fn fetch_and_parse(&self, source_id: &str, url: &str) -> Result<ParsedFeed> {
        let doc = match tokio::time::timeout(
            self.cfg.poll_timeout,
            self.fetcher.fetch(source_id, url),
        )
        .await
        {
            Ok(r) => r?,
            Err(_) => {
                return Err(PipelineError::TransientSource {
                    source_id: source_id.to_string(),
                    message: format!("timed out after {}ms", self.cfg.poll_timeout.as_millis()),
                })
            }
        };
        feed::parse_feed(source_id, &doc)
    }

    /// Entries inside the freshness window, capped per source.
    fn fresh_items(&self, source_id: &str, parsed: ParsedFeed) -> Vec<ContentItem> {
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.cfg.freshness_window)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let mut stale = 0u64;
        let items: Vec<ContentItem> = parsed
            .entries
            .into_iter()
            .filter_map(|e| {
                let published = e.published_at.unwrap_or(now);
                if now.signed_duration_since(published) > window {
                    stale += 1;
                    return None;
                }
                Some(ContentItem::discovered(
                    source_id, e.url, e.title, e.body, published, now,
                ))
            })
            .take(self.cfg.max_items_per_source)
            .collect();
        if stale > 0 {
            counter!(ITEMS_STALE).increment(stale);
        }
        items
    }

    /// First sighting → stored and yielded; repeat → occurrence bump.
    async fn admit(&self, item: ContentItem) -> Option<ContentItem> {
        let first = self.window.lock().insert(&item.dedup_hash, Instant::now());
        if !first {
            counter!(ITEMS_DUPLICATE).increment(1);
            if let Err(e) = self.store.record_occurrence(&item.id).await {
                tracing::warn!(target: "scout", item_id = %item.id, error = %e, "occurrence not recorded");
            }
            return None;
        }
        match self.store.insert_item(item.clone()).await {
            Ok(InsertOutcome::Inserted) => {
                counter!(ITEMS_DISCOVERED).increment(1);
                Some(item)
            }
            Ok(InsertOutcome::Duplicate { .. }) => {
                counter!(ITEMS_DUPLICATE).increment(1);
                None
            }
            Err(e) => {
                tracing::warn!(target: "scout", item_id = %item.id, error = %e, "item not stored");
                None
            }
        }
    }
}

#[async_trait]
impl AgentHandler for ScoutAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Scout
    }

    async fn handle(&self, payload: TaskPayload) -> Result<TaskOutput> {
        let item_ids = match payload {
            TaskPayload::Discover { source_ids } => self
                .run(&source_ids)
                .await?
                .into_iter()
                .map(|it| it.id)
                .collect(),
            TaskPayload::Scrape { url } => self
                .scrape_url(&url)
                .await?
                .into_iter()
                .map(|it| it.id)
                .collect(),
            _ => {
                return Err(PipelineError::Validation(
                    "scout only handles discover and scrape payloads".into(),
                ))
            }
        };
        Ok(TaskOutput::Discovered { item_ids })
    }

    /// Unhealthy only when every configured source is paused.
    async fn probe(&self) -> Result<()> {
        let snaps = self.registry.snapshots();
        if !snaps.is_empty() && snaps.iter().all(|s| s.health == HealthState::Paused) {
            return Err(PipelineError::AgentUnavailable(AgentType::Scout));
        }
        Ok(())
    }
}
