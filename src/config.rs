//! Pipeline configuration: TOML file + env overrides + built-in defaults.
//!
//! Resolution order for the file:
//! 1) `$PIPELINE_CONFIG_PATH`
//! 2) `config/pipeline.toml`
//! 3) defaults (no sources configured)
//!
//! The feed-source list lives either inline as `[[sources]]` tables or in a
//! separate TOML/JSON file named by `sources_path`.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::health::HealthThresholds;
use crate::model::Category;

pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

/// One configured feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub url: String,
    #[serde(default)]
    pub category_hint: Option<Category>,
    /// Derived from the credibility table when absent.
    #[serde(default)]
    pub credibility_weight: Option<f32>,
    /// Falls back to `min_request_interval_default_ms`.
    #[serde(default)]
    pub min_request_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // cadence
    pub discovery_interval_secs: u64,
    pub newsletter_interval_secs: u64,
    pub archive_sweep_interval_secs: u64,
    pub scheduler_tick_ms: u64,

    // discovery
    pub max_concurrent_sources: usize,
    pub max_items_per_source: usize,
    pub freshness_window_secs: u64,
    pub min_request_interval_default_ms: u64,
    pub poll_attempts_per_call: u32,
    pub poll_timeout_ms: u64,
    pub poll_backoff_base_ms: u64,
    pub source_cooldown_secs: u64,
    pub dedup_window_capacity: usize,
    /// Replace feed teasers with the article page text when it is longer.
    pub fetch_article_bodies: bool,
    pub max_concurrent_article_fetches: usize,

    // curation
    pub quality_threshold: f32,
    pub relevance_threshold: f32,
    pub near_duplicate_threshold: f32,
    pub w_readability: f32,
    pub w_credibility: f32,
    pub w_freshness: f32,
    pub impact_high: f32,
    pub impact_low: f32,
    pub relevance_saturation: f32,
    pub curation_batch_size: usize,

    // composition
    pub max_items_per_newsletter: usize,
    pub min_items_per_newsletter: usize,
    pub subject_seed: u64,

    // tasks
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub task_timeout_secs: u64,
    pub dispatch_retry_limit: u32,
    pub max_queue_depth_per_agent: usize,
    pub scout_workers: usize,
    pub curator_workers: usize,
    pub writer_workers: usize,

    // health
    pub health_failure_threshold: u32,
    pub health_pause_threshold: u32,
    pub health_recovery_threshold: u32,
    pub health_probe_interval_secs: u64,

    // retention
    pub retention_window_secs: u64,

    // sources
    pub sources: Vec<SourceConfig>,
    pub sources_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            discovery_interval_secs: 30 * 60,
            newsletter_interval_secs: 7 * 24 * 3600,
            archive_sweep_interval_secs: 3600,
            scheduler_tick_ms: 1_000,

            max_concurrent_sources: 5,
            max_items_per_source: 10,
            freshness_window_secs: 48 * 3600,
            min_request_interval_default_ms: 2_000,
            poll_attempts_per_call: 3,
            poll_timeout_ms: 30_000,
            poll_backoff_base_ms: 500,
            source_cooldown_secs: 15 * 60,
            dedup_window_capacity: 10_000,
            fetch_article_bodies: true,
            max_concurrent_article_fetches: 4,

            quality_threshold: 0.6,
            relevance_threshold: 0.4,
            near_duplicate_threshold: 0.85,
            w_readability: 0.3,
            w_credibility: 0.4,
            w_freshness: 0.3,
            impact_high: 0.75,
            impact_low: 0.45,
            relevance_saturation: 6.0,
            curation_batch_size: 50,

            max_items_per_newsletter: 15,
            min_items_per_newsletter: 3,
            subject_seed: 0x5EED,

            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 60_000,
            task_timeout_secs: 300,
            dispatch_retry_limit: 5,
            max_queue_depth_per_agent: 100,
            scout_workers: 1,
            curator_workers: 2,
            writer_workers: 1,

            health_failure_threshold: 3,
            health_pause_threshold: 2,
            health_recovery_threshold: 2,
            health_probe_interval_secs: 60,

            retention_window_secs: 30 * 24 * 3600,

            sources: Vec::new(),
            sources_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load using `$PIPELINE_CONFIG_PATH`, then `config/pipeline.toml`, then defaults.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            Self::load_from(&pb)?
        } else {
            let p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if p.exists() {
                Self::load_from(&p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML file and resolve an external source list relative to it.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&content)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;

        if let Some(rel) = cfg.sources_path.clone() {
            let resolved = if rel.is_absolute() {
                rel
            } else {
                path.parent().unwrap_or_else(|| Path::new(".")).join(rel)
            };
            cfg.sources.extend(load_sources_from(&resolved)?);
        }
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn apply_env_overrides(&mut self) {
        env_override("DISCOVERY_INTERVAL_SECS", &mut self.discovery_interval_secs);
        env_override("NEWSLETTER_INTERVAL_SECS", &mut self.newsletter_interval_secs);
        env_override("MAX_CONCURRENT_SOURCES", &mut self.max_concurrent_sources);
        if env_override("QUALITY_THRESHOLD", &mut self.quality_threshold) {
            self.quality_threshold = self.quality_threshold.clamp(0.0, 1.0);
        }
        if env_override("RELEVANCE_THRESHOLD", &mut self.relevance_threshold) {
            self.relevance_threshold = self.relevance_threshold.clamp(0.0, 1.0);
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("quality_threshold", self.quality_threshold),
            ("relevance_threshold", self.relevance_threshold),
            ("near_duplicate_threshold", self.near_duplicate_threshold),
            ("impact_high", self.impact_high),
            ("impact_low", self.impact_low),
        ] {
            if !(0.0..=1.0).contains(&v) {
                bail!("{name} must be within [0,1], got {v}");
            }
        }
        if self.impact_low > self.impact_high {
            bail!("impact_low must not exceed impact_high");
        }
        if self.w_readability < 0.0 || self.w_credibility < 0.0 || self.w_freshness < 0.0 {
            bail!("scoring weights must be non-negative");
        }
        if self.w_readability + self.w_credibility + self.w_freshness <= 0.0 {
            bail!("at least one scoring weight must be positive");
        }
        if self.relevance_saturation <= 0.0 {
            bail!("relevance_saturation must be positive");
        }
        for (name, v) in [
            ("discovery_interval_secs", self.discovery_interval_secs),
            ("newsletter_interval_secs", self.newsletter_interval_secs),
            ("archive_sweep_interval_secs", self.archive_sweep_interval_secs),
            ("scheduler_tick_ms", self.scheduler_tick_ms),
            ("freshness_window_secs", self.freshness_window_secs),
            ("task_timeout_secs", self.task_timeout_secs),
            ("health_probe_interval_secs", self.health_probe_interval_secs),
            ("backoff_base_ms", self.backoff_base_ms),
        ] {
            if v == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        for (name, v) in [
            ("max_concurrent_sources", self.max_concurrent_sources),
            ("max_items_per_source", self.max_items_per_source),
            ("max_concurrent_article_fetches", self.max_concurrent_article_fetches),
            ("max_items_per_newsletter", self.max_items_per_newsletter),
            ("curation_batch_size", self.curation_batch_size),
            ("scout_workers", self.scout_workers),
            ("curator_workers", self.curator_workers),
            ("writer_workers", self.writer_workers),
        ] {
            if v == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if self.max_attempts == 0 || self.poll_attempts_per_call == 0 {
            bail!("attempt limits must be greater than zero");
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            bail!("backoff_cap_ms must be >= backoff_base_ms");
        }
        if self.min_items_per_newsletter > self.max_items_per_newsletter {
            bail!("min_items_per_newsletter must not exceed max_items_per_newsletter");
        }
        let mut seen = BTreeSet::new();
        for s in &self.sources {
            if s.source_id.trim().is_empty() || s.url.trim().is_empty() {
                bail!("sources need a non-empty source_id and url");
            }
            if !seen.insert(s.source_id.as_str()) {
                bail!("duplicate source_id '{}'", s.source_id);
            }
            if let Some(w) = s.credibility_weight {
                if !(0.0..=1.0).contains(&w) {
                    bail!("credibility_weight of '{}' must be within [0,1]", s.source_id);
                }
            }
        }
        Ok(())
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }
    pub fn newsletter_interval(&self) -> Duration {
        Duration::from_secs(self.newsletter_interval_secs)
    }
    pub fn archive_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.archive_sweep_interval_secs)
    }
    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_millis(self.scheduler_tick_ms)
    }
    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
    pub fn poll_backoff_base(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_base_ms)
    }
    pub fn source_cooldown(&self) -> Duration {
        Duration::from_secs(self.source_cooldown_secs)
    }
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
    pub fn health_probe_interval(&self) -> Duration {
        Duration::from_secs(self.health_probe_interval_secs)
    }
    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_window_secs)
    }

    pub fn health_thresholds(&self) -> HealthThresholds {
        HealthThresholds::new(
            self.health_failure_threshold,
            self.health_pause_threshold,
            self.health_recovery_threshold,
        )
    }
}

/// Overwrite `slot` from env var `name` when it parses. Returns whether it did.
fn env_override<T: FromStr>(name: &str, slot: &mut T) -> bool {
    match std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok()) {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

/// Load a feed-source list from TOML (`[[sources]]`) or a JSON array.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceConfig>> {
    #[derive(Deserialize)]
    struct TomlSources {
        sources: Vec<SourceConfig>,
    }

    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(v) = toml::from_str::<TomlSources>(s) {
            return Ok(clean_sources(v.sources));
        }
    }
    if let Ok(v) = serde_json::from_str::<Vec<SourceConfig>>(s) {
        return Ok(clean_sources(v));
    }
    if !try_toml {
        if let Ok(v) = toml::from_str::<TomlSources>(s) {
            return Ok(clean_sources(v.sources));
        }
    }
    Err(anyhow!("unsupported sources format"))
}

fn clean_sources(items: Vec<SourceConfig>) -> Vec<SourceConfig> {
    items
        .into_iter()
        .map(|mut s| {
            s.source_id = s.source_id.trim().to_string();
            s.url = s.url.trim().to_string();
            s
        })
        .filter(|s| !s.source_id.is_empty() && !s.url.is_empty())
        .collect()
}
