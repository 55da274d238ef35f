//! Curation agent: scoring, categorization, threshold filtering and
//! near-duplicate clustering.
//!
//! `curate` is a pure function of an item, its source profile and the clock.
//! `curate_batch` adds batch-level clustering; the handler persists a whole
//! batch with one atomic store update.

pub mod cluster;
pub mod keywords;
pub mod scoring;
pub mod trends;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::metrics::{ITEMS_CURATED, ITEMS_REJECTED};
use crate::model::{
    AgentType, BusinessImpact, ContentItem, ItemStatus, RejectReason, SourceProfile, TaskOutput,
    TaskPayload,
};
use crate::orchestrator::registry::AgentHandler;
use crate::sources::SourceRegistry;
use crate::store::ContentStore;

use keywords::{token_haystack, KeywordRelevance, KeywordTable, RelevanceModel};
use scoring::{freshness_decay, quality_score, readability, QualityInputs, QualityWeights};

pub use trends::{detect_trends, TrendReport};

/// Summary cap, in chars.
pub const SUMMARY_MAX_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct CuratorConfig {
    pub quality_threshold: f32,
    pub relevance_threshold: f32,
    pub near_duplicate_threshold: f32,
    pub weights: QualityWeights,
    pub impact_high: f32,
    pub impact_low: f32,
    pub freshness_window: Duration,
}

impl From<&PipelineConfig> for CuratorConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            quality_threshold: cfg.quality_threshold,
            relevance_threshold: cfg.relevance_threshold,
            near_duplicate_threshold: cfg.near_duplicate_threshold,
            weights: QualityWeights {
                w_readability: cfg.w_readability,
                w_credibility: cfg.w_credibility,
                w_freshness: cfg.w_freshness,
            },
            impact_high: cfg.impact_high,
            impact_low: cfg.impact_low,
            freshness_window: cfg.freshness_window(),
        }
    }
}

/// `high` if both scores reach T_high, `low` if both are under T_low.
pub fn business_impact(quality: f32, relevance: f32, t_high: f32, t_low: f32) -> BusinessImpact {
    if quality >= t_high && relevance >= t_high {
        BusinessImpact::High
    } else if quality < t_low && relevance < t_low {
        BusinessImpact::Low
    } else {
        BusinessImpact::Medium
    }
}

/// Technology and industry terms → tag.
const TAG_TABLE: [(&str, &str); 16] = [
    ("artificial intelligence", "ai"),
    ("ai", "ai"),
    ("machine learning", "ml"),
    ("deep learning", "deep-learning"),
    ("computer vision", "computer-vision"),
    ("robotics", "robotics"),
    ("automation", "automation"),
    ("iot", "iot"),
    ("blockchain", "blockchain"),
    ("digital twin", "digital-twin"),
    ("bim", "bim"),
    ("construction", "construction"),
    ("architecture", "architecture"),
    ("engineering", "engineering"),
    ("infrastructure", "infrastructure"),
    ("real estate", "real-estate"),
];

/// Sorted, deduplicated tags found in title + body.
pub fn tags_for(title: &str, body: &str) -> Vec<String> {
    let hay = token_haystack(&format!("{title} {body}"));
    let mut tags: Vec<String> = TAG_TABLE
        .iter()
        .filter(|(term, _)| hay.contains(&format!(" {term} ")))
        .map(|(_, tag)| tag.to_string())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// First two sentences of the body (the title if the body is empty), capped.
pub fn summarize(title: &str, body: &str) -> String {
    let text = body.trim();
    if text.is_empty() {
        return title.trim().to_string();
    }
    let mut end = text.len();
    let mut seen = 0;
    for (i, ch) in text.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            let next = text[i + ch.len_utf8()..].chars().next();
            if next.map_or(true, char::is_whitespace) {
                seen += 1;
                if seen == 2 {
                    end = i + ch.len_utf8();
                    break;
                }
            }
        }
    }
    let summary = text[..end].trim();
    if summary.chars().count() > SUMMARY_MAX_CHARS {
        let cut: String = summary.chars().take(SUMMARY_MAX_CHARS - 3).collect();
        format!("{}...", cut.trim_end())
    } else {
        summary.to_string()
    }
}

pub struct CuratorAgent {
    cfg: CuratorConfig,
    model: Arc<dyn RelevanceModel>,
    registry: Arc<SourceRegistry>,
    store: Arc<dyn ContentStore>,
}

impl CuratorAgent {
    pub fn new(
        cfg: CuratorConfig,
        model: Arc<dyn RelevanceModel>,
        registry: Arc<SourceRegistry>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        crate::metrics::ensure_metrics_described();
        Self {
            cfg,
            model,
            registry,
            store,
        }
    }

    /// Curator with the built-in keyword relevance model.
    pub fn with_keyword_model(
        pipeline: &PipelineConfig,
        registry: Arc<SourceRegistry>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        let model = KeywordRelevance::new(KeywordTable::default_seed(), pipeline.relevance_saturation);
        Self::new(CuratorConfig::from(pipeline), Arc::new(model), registry, store)
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.cfg
    }

    /// Score one item. Only scoring/classification fields change.
    pub fn curate(&self, item: &ContentItem, profile: SourceProfile, now: DateTime<Utc>) -> ContentItem {
        let mut out = item.clone();

        let inputs = QualityInputs::new(
            readability(&format!("{} {}", item.title, item.body)),
            profile.credibility_weight,
            freshness_decay(item.published_at, now, self.cfg.freshness_window),
        );
        let quality = quality_score(&inputs, &self.cfg.weights);
        let assessed = self.model.assess(item, profile.category_hint);
        let relevance = assessed.relevance.clamp(0.0, 1.0);

        out.quality_score = Some(quality);
        out.relevance_score = Some(relevance);
        out.category = Some(assessed.category);
        out.business_impact = Some(business_impact(
            quality,
            relevance,
            self.cfg.impact_high,
            self.cfg.impact_low,
        ));
        out.tags = tags_for(&item.title, &item.body);
        out.summary = Some(summarize(&item.title, &item.body));
        out.cluster_size = 0;

        let rejection = if quality < self.cfg.quality_threshold {
            Some(RejectReason::BelowQualityThreshold)
        } else if relevance < self.cfg.relevance_threshold {
            Some(RejectReason::BelowRelevanceThreshold)
        } else {
            None
        };
        out.status = if rejection.is_some() {
            ItemStatus::Rejected
        } else {
            ItemStatus::Curated
        };
        out.rejection = rejection;
        out
    }

    /// Curate a batch and collapse near duplicates among the survivors.
    pub fn curate_batch(&self, items: &[ContentItem], now: DateTime<Utc>) -> Vec<ContentItem> {
        let mut batch: Vec<ContentItem> = items
            .iter()
            .map(|it| self.curate(it, self.registry.profile(&it.source_id), now))
            .collect();
        cluster::cluster_near_duplicates(&mut batch, self.cfg.near_duplicate_threshold);
        batch
    }

    /// Load, curate and persist the given items. Items no longer in
    /// `discovered` state are left alone, so a retried task is harmless.
    pub async fn curate_ids(&self, item_ids: &[String]) -> Result<(usize, usize)> {
        let pending: Vec<ContentItem> = self
            .store
            .get_items(item_ids)
            .await?
            .into_iter()
            .filter(|it| it.status == ItemStatus::Discovered)
            .collect();
        if pending.is_empty() {
            return Ok((0, 0));
        }

        let batch = self.curate_batch(&pending, Utc::now());
        let applied: HashSet<String> = self
            .store
            .apply_curation(batch.clone())
            .await?
            .into_iter()
            .collect();
        if applied.len() < batch.len() {
            tracing::debug!(
                target: "curator",
                skipped = batch.len() - applied.len(),
                "items settled elsewhere while curating"
            );
        }

        let mut curated = 0;
        let mut rejected = 0;
        for it in batch.iter().filter(|it| applied.contains(&it.id)) {
            match &it.rejection {
                Some(reason) => {
                    rejected += 1;
                    counter!(ITEMS_REJECTED, "reason" => reason.label()).increment(1);
                }
                None => curated += 1,
            }
        }
        counter!(ITEMS_CURATED).increment(curated as u64);
        tracing::info!(target: "curator", curated, rejected, "batch curated");
        Ok((curated, rejected))
    }
}

#[async_trait]
impl AgentHandler for CuratorAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Curator
    }

    async fn handle(&self, payload: TaskPayload) -> Result<TaskOutput> {
        let TaskPayload::Curate { item_ids } = payload else {
            return Err(PipelineError::Validation(
                "curator only handles curate payloads".into(),
            ));
        };
        let (curated, rejected) = self.curate_ids(&item_ids).await?;
        Ok(TaskOutput::Curated { curated, rejected })
    }

    /// Scores a canned item; any panic-free result means the model is usable.
    async fn probe(&self) -> Result<()> {
        let now = Utc::now();
        let sample = ContentItem::discovered(
            "probe",
            "probe://curator",
            "Test AI in construction",
            "Artificial intelligence in construction automation.",
            now,
            now,
        );
        let scored = self.curate(&sample, SourceProfile::default(), now);
        match (scored.quality_score, scored.relevance_score) {
            (Some(q), Some(r)) if q.is_finite() && r.is_finite() => Ok(()),
            _ => Err(PipelineError::AgentUnavailable(AgentType::Curator)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthThresholds;
    use crate::model::{Category, Source};
    use crate::store::MemoryStore;

    fn agent(cfg: CuratorConfig) -> CuratorAgent {
        let registry = Arc::new(SourceRegistry::new(
            HealthThresholds::new(3, 2, 2),
            Duration::from_secs(60),
        ));
        registry.register(Source::new(
            "aecmag",
            "https://aecmag.com/feed",
            Some(Category::BimDigitalTwins),
            0.9,
            0,
        ));
        let model = KeywordRelevance::new(KeywordTable::default_seed(), 6.0);
        CuratorAgent::new(cfg, Arc::new(model), registry, Arc::new(MemoryStore::new()))
    }

    fn cfg() -> CuratorConfig {
        CuratorConfig::from(&PipelineConfig::default())
    }

    #[test]
    fn impact_tiers() {
        assert_eq!(business_impact(0.8, 0.9, 0.75, 0.45), BusinessImpact::High);
        assert_eq!(business_impact(0.3, 0.2, 0.75, 0.45), BusinessImpact::Low);
        assert_eq!(business_impact(0.8, 0.2, 0.75, 0.45), BusinessImpact::Medium);
    }

    #[test]
    fn summary_takes_two_sentences() {
        let s = summarize("T", "First one. Second one! Third one? Fourth.");
        assert_eq!(s, "First one. Second one!");
        assert_eq!(summarize("Title only", ""), "Title only");
        assert_eq!(summarize("T", "v1.2 ships today. It is fast."), "v1.2 ships today. It is fast.");
        let long = "word ".repeat(200);
        assert!(summarize("T", &long).chars().count() <= SUMMARY_MAX_CHARS);
    }

    #[test]
    fn tags_are_sorted_and_unique() {
        let t = tags_for("AI meets BIM", "Artificial intelligence for construction.");
        assert_eq!(t, vec!["ai", "bim", "construction"]);
    }

    #[test]
    fn curate_never_touches_body_or_url() {
        let a = agent(cfg());
        let now = Utc::now();
        let it = ContentItem::discovered(
            "aecmag",
            "https://aecmag.com/a",
            "Digital twin platform for BIM",
            "Artificial intelligence meets BIM.",
            now,
            now,
        );
        let out = a.curate(&it, a.registry.profile("aecmag"), now);
        assert_eq!(out.body, it.body);
        assert_eq!(out.url, it.url);
        assert_eq!(out.id, it.id);
        assert_eq!(out.category, Some(Category::BimDigitalTwins));
        assert!(out.quality_score.is_some() && out.relevance_score.is_some());
    }

    #[test]
    fn quality_is_checked_before_relevance() {
        let a = agent(CuratorConfig {
            quality_threshold: 0.99,
            relevance_threshold: 0.99,
            ..cfg()
        });
        let now = Utc::now();
        let it = ContentItem::discovered("nobody", "https://x.test/q", "Bake sale", "", now, now);
        let out = a.curate(&it, SourceProfile::default(), now);
        assert_eq!(out.status, ItemStatus::Rejected);
        assert_eq!(out.rejection, Some(RejectReason::BelowQualityThreshold));
    }
}
