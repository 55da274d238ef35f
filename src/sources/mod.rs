//! Source registry: per-source reliability state, health and request spacing.
//!
//! Each source owns two locks. `poll_lock` (async) is held for a whole poll so
//! the same source is never polled concurrently; `state` (sync) guards the
//! counters and is only held for short, non-awaiting updates.

pub mod credibility;
pub mod rate_limit;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::time::Instant;

use crate::config::PipelineConfig;
use crate::health::{HealthState, HealthThresholds, HealthTracker, Transition};
use crate::model::{Source, SourceProfile};

pub use credibility::CredibilityTable;
pub use rate_limit::RateLimiter;

/// Polls kept for the rolling success rate and latency mean.
pub const ROLLING_WINDOW: usize = 20;

/// What the scout may do with a source right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollGate {
    /// Poll with the normal per-call retry count.
    Normal,
    /// Paused source whose cool-down elapsed: one attempt, no retries.
    Probe,
    /// Paused and still cooling down.
    Skip,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    ok: bool,
    latency_ms: f64,
}

struct SourceState {
    source: Source,
    tracker: HealthTracker,
    limiter: RateLimiter,
    window: VecDeque<Outcome>,
    paused_at: Option<Instant>,
}

impl SourceState {
    fn push_outcome(&mut self, o: Outcome) {
        if self.window.len() == ROLLING_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(o);

        let ok: Vec<f64> = self
            .window
            .iter()
            .filter(|o| o.ok)
            .map(|o| o.latency_ms)
            .collect();
        self.source.success_rate = ok.len() as f32 / self.window.len() as f32;
        if !ok.is_empty() {
            self.source.avg_response_time_ms = ok.iter().sum::<f64>() / ok.len() as f64;
        }
    }

    fn sync_health(&mut self, transition: Option<Transition>, now: Instant) {
        self.source.health = self.tracker.state();
        self.source.consecutive_failures = self.tracker.consecutive_failures();
        self.source.consecutive_successes = self.tracker.consecutive_successes();
        match self.tracker.state() {
            // Entering pause, or a failed probe: restart the cool-down.
            HealthState::Paused => self.paused_at = Some(now),
            _ => self.paused_at = None,
        }
        if let Some(t) = transition {
            tracing::info!(
                target: "sources",
                source_id = %self.source.source_id,
                from = t.from.as_str(),
                to = t.to.as_str(),
                "source health changed"
            );
        }
    }
}

/// Live handle to one source.
pub struct SourceEntry {
    poll_lock: AsyncMutex<()>,
    state: Mutex<SourceState>,
    cooldown: Duration,
}

impl SourceEntry {
    fn new(source: Source, thresholds: HealthThresholds, cooldown: Duration) -> Self {
        let limiter = RateLimiter::new(Duration::from_millis(source.min_request_interval_ms));
        Self {
            poll_lock: AsyncMutex::new(()),
            state: Mutex::new(SourceState {
                source,
                tracker: HealthTracker::new(thresholds),
                limiter,
                window: VecDeque::with_capacity(ROLLING_WINDOW),
                paused_at: None,
            }),
            cooldown,
        }
    }

    pub fn source_id(&self) -> String {
        self.state.lock().source.source_id.clone()
    }

    pub fn url(&self) -> String {
        self.state.lock().source.url.clone()
    }

    /// Exclusive right to poll this source; hold it for the whole poll.
    pub async fn lock_poll(&self) -> AsyncMutexGuard<'_, ()> {
        self.poll_lock.lock().await
    }

    pub fn gate(&self, now: Instant) -> PollGate {
        let st = self.state.lock();
        match (st.tracker.state(), st.paused_at) {
            (HealthState::Paused, Some(at)) if now < at + self.cooldown => PollGate::Skip,
            (HealthState::Paused, _) => PollGate::Probe,
            _ => PollGate::Normal,
        }
    }

    /// Next instant a request may be sent; the caller sleeps until then.
    pub fn reserve_slot(&self, now: Instant) -> Instant {
        self.state.lock().limiter.reserve(now)
    }

    pub fn record_success(
        &self,
        latency: Duration,
        items: usize,
        at: DateTime<Utc>,
        now: Instant,
    ) -> Option<Transition> {
        let mut st = self.state.lock();
        let t = st.tracker.record_success();
        st.push_outcome(Outcome {
            ok: true,
            latency_ms: latency.as_secs_f64() * 1000.0,
        });
        st.source.total_polls += 1;
        st.source.total_items_discovered += items as u64;
        st.source.last_polled_at = Some(at);
        st.source.last_success_at = Some(at);
        st.source.last_error = None;
        st.sync_health(t, now);
        t
    }

    pub fn record_failure(
        &self,
        error: &str,
        latency: Duration,
        at: DateTime<Utc>,
        now: Instant,
    ) -> Option<Transition> {
        let mut st = self.state.lock();
        let t = st.tracker.record_failure();
        st.push_outcome(Outcome {
            ok: false,
            latency_ms: latency.as_secs_f64() * 1000.0,
        });
        st.source.total_polls += 1;
        st.source.last_polled_at = Some(at);
        st.source.last_error = Some(error.to_string());
        st.sync_health(t, now);
        t
    }

    pub fn snapshot(&self) -> Source {
        self.state.lock().source.clone()
    }

    pub fn health(&self) -> HealthState {
        self.state.lock().tracker.state()
    }
}

/// All configured sources, keyed by id.
pub struct SourceRegistry {
    entries: RwLock<BTreeMap<String, Arc<SourceEntry>>>,
    thresholds: HealthThresholds,
    cooldown: Duration,
}

impl SourceRegistry {
    pub fn new(thresholds: HealthThresholds, cooldown: Duration) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            thresholds,
            cooldown,
        }
    }

    /// Build from config; missing credibility weights come from `table`.
    pub fn from_config(cfg: &PipelineConfig, table: &CredibilityTable) -> Self {
        let reg = Self::new(cfg.health_thresholds(), cfg.source_cooldown());
        for sc in &cfg.sources {
            let weight = sc
                .credibility_weight
                .unwrap_or_else(|| table.weight_for(&sc.source_id, &sc.url));
            reg.register(Source::new(
                sc.source_id.clone(),
                sc.url.clone(),
                sc.category_hint,
                weight,
                sc.min_request_interval_ms
                    .unwrap_or(cfg.min_request_interval_default_ms),
            ));
        }
        reg
    }

    /// Add or replace a source. Replacing resets its live state.
    pub fn register(&self, source: Source) {
        let id = source.source_id.clone();
        let entry = Arc::new(SourceEntry::new(source, self.thresholds, self.cooldown));
        self.entries.write().insert(id, entry);
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<SourceEntry>> {
        self.entries.read().get(source_id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Metrics snapshot of every source, ordered by id.
    pub fn snapshots(&self) -> Vec<Source> {
        let entries: Vec<Arc<SourceEntry>> = self.entries.read().values().cloned().collect();
        entries.iter().map(|e| e.snapshot()).collect()
    }

    /// Scoring view of a source; unknown ids get the neutral default.
    pub fn profile(&self, source_id: &str) -> SourceProfile {
        self.get(source_id)
            .map(|e| SourceProfile::from(&e.snapshot()))
            .unwrap_or_default()
    }
}
