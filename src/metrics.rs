//! Prometheus recorder and the `/metrics` route.
//!
//! The recorder is process-global; `Metrics::init` installs it once and hands
//! out clones of the same handle afterwards (tests build several routers).

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const ITEMS_DISCOVERED: &str = "scout_items_discovered_total";
pub const ITEMS_DUPLICATE: &str = "scout_items_duplicate_total";
pub const ITEMS_STALE: &str = "scout_items_stale_total";
pub const PARSE_ERRORS: &str = "scout_parse_errors_total";
pub const POLL_FAILURES: &str = "scout_poll_failures_total";
pub const POLL_LATENCY_MS: &str = "scout_poll_latency_ms";
pub const SOURCES_SKIPPED: &str = "scout_sources_skipped_total";
pub const LAST_DISCOVERY_TS: &str = "scout_last_run_ts";
pub const ARTICLE_BODIES: &str = "scout_article_bodies_total";
pub const ITEMS_CURATED: &str = "curator_items_curated_total";
pub const ITEMS_REJECTED: &str = "curator_items_rejected_total";
pub const ARTIFACTS_PRODUCED: &str = "writer_artifacts_total";
pub const TASKS_SUBMITTED: &str = "orchestrator_tasks_submitted_total";
pub const TASKS_DISPATCHED: &str = "orchestrator_tasks_dispatched_total";
pub const TASKS_RETRIED: &str = "orchestrator_tasks_retried_total";
pub const TASKS_DEAD: &str = "orchestrator_tasks_dead_total";
pub const QUEUE_OVERFLOW_DROPS: &str = "orchestrator_queue_overflow_drops_total";
pub const SCHEDULER_SKIPS: &str = "orchestrator_scheduler_skips_total";
pub const QUEUE_DEPTH: &str = "orchestrator_queue_depth";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(ITEMS_DISCOVERED, "New items admitted by discovery.");
        describe_counter!(ITEMS_DUPLICATE, "Items dropped as exact duplicates.");
        describe_counter!(ITEMS_STALE, "Items older than the freshness window.");
        describe_counter!(PARSE_ERRORS, "Feed- and item-level parse errors.");
        describe_counter!(POLL_FAILURES, "Failed poll attempts.");
        describe_histogram!(POLL_LATENCY_MS, "Source poll latency in milliseconds.");
        describe_counter!(SOURCES_SKIPPED, "Polls skipped because the source is paused.");
        describe_gauge!(LAST_DISCOVERY_TS, "Unix ts when discovery last finished.");
        describe_counter!(
            ARTICLE_BODIES,
            "Article page fetches, by outcome (extracted / fallback)."
        );
        describe_counter!(ITEMS_CURATED, "Items accepted by curation.");
        describe_counter!(ITEMS_REJECTED, "Items rejected by curation, by reason.");
        describe_counter!(ARTIFACTS_PRODUCED, "Newsletter artifacts produced.");
        describe_counter!(TASKS_SUBMITTED, "Tasks accepted into the queue.");
        describe_counter!(TASKS_DISPATCHED, "Tasks handed to an agent handler.");
        describe_counter!(TASKS_RETRIED, "Failed tasks scheduled for another attempt.");
        describe_counter!(TASKS_DEAD, "Tasks moved to the dead-letter log.");
        describe_counter!(
            QUEUE_OVERFLOW_DROPS,
            "Queued tasks dropped because their agent queue was full."
        );
        describe_counter!(
            SCHEDULER_SKIPS,
            "Recurring job fires skipped because the previous run was still active."
        );
        describe_gauge!(QUEUE_DEPTH, "Tasks waiting in the queue.");
    });
}

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (first call only) and describe all series.
    pub fn init() -> Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")
            })?
            .clone();
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
