//! Composition agent.
//!
//! `compose` is deterministic in `(period_key, candidate pool)`: ranking uses
//! total-order keys, both encodings render from the same sections, and the
//! only randomness is the seeded subject-line shuffle. `created_at` is the
//! one field that differs between two runs.

pub mod render;
pub mod select;
pub mod subject;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::metrics::ARTIFACTS_PRODUCED;
use crate::model::{
    validate_period_key, AgentType, BusinessImpact, ContentItem, ExecutiveSummary,
    NewsletterArtifact, NewsletterMetrics, Section, TaskOutput, TaskPayload,
};
use crate::orchestrator::registry::AgentHandler;
use crate::store::ContentStore;

use render::RenderInput;

/// Reading speed used for the read-time estimate.
pub const WORDS_PER_MINUTE: usize = 150;
const HIGHLIGHTS: usize = 3;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub max_items: usize,
    pub min_items: usize,
    pub subject_seed: u64,
}

impl From<&PipelineConfig> for WriterConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            max_items: cfg.max_items_per_newsletter,
            min_items: cfg.min_items_per_newsletter,
            subject_seed: cfg.subject_seed,
        }
    }
}

pub fn artifact_id_for(period_key: &str) -> String {
    let digest = Sha256::digest(period_key.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("nl-{hex}")
}

/// Set of period keys with a composition in flight.
#[derive(Default)]
pub struct SingleFlight {
    running: Mutex<HashSet<String>>,
}

/// Releases the period key when dropped.
pub struct FlightGuard<'a> {
    owner: &'a SingleFlight,
    key: String,
}

impl SingleFlight {
    pub fn try_begin(&self, period_key: &str) -> Result<FlightGuard<'_>> {
        if !self.running.lock().insert(period_key.to_string()) {
            return Err(PipelineError::AlreadyRunning(period_key.to_string()));
        }
        Ok(FlightGuard {
            owner: self,
            key: period_key.to_string(),
        })
    }

    pub fn is_running(&self, period_key: &str) -> bool {
        self.running.lock().contains(period_key)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.owner.running.lock().remove(&self.key);
    }
}

fn executive_summary(ranked: &[ContentItem], sections: &[Section], high: usize) -> ExecutiveSummary {
    let overview = format!(
        "This issue covers {} developments in AI for architecture, engineering and construction across {} categories, including {} high-impact {}.",
        ranked.len(),
        sections.len(),
        high,
        if high == 1 { "story" } else { "stories" }
    );
    let highlights = ranked
        .iter()
        .take(HIGHLIGHTS)
        .map(|it| match it.summary.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => format!("{}: {}", it.title, s),
            None => it.title.clone(),
        })
        .collect();
    ExecutiveSummary {
        overview,
        highlights,
    }
}

fn newsletter_metrics(ranked: &[ContentItem], summary: &ExecutiveSummary) -> NewsletterMetrics {
    let high = ranked
        .iter()
        .filter(|it| it.business_impact == Some(BusinessImpact::High))
        .count();
    let categories: BTreeSet<_> = ranked.iter().filter_map(|it| it.category).collect();
    let words: usize = ranked
        .iter()
        .map(|it| {
            it.title.split_whitespace().count()
                + it.summary.as_deref().unwrap_or("").split_whitespace().count()
        })
        .sum::<usize>()
        + summary.overview.split_whitespace().count();
    let quality_score_avg = if ranked.is_empty() {
        0.0
    } else {
        ranked.iter().map(|it| it.quality_score.unwrap_or(0.0)).sum::<f32>() / ranked.len() as f32
    };
    NewsletterMetrics {
        total_articles: ranked.len(),
        high_impact_articles: high,
        categories_covered: categories.len(),
        estimated_read_minutes: (words / WORDS_PER_MINUTE).max(1),
        quality_score_avg,
    }
}

/// Build the artifact for `period_key` from `pool`. Pure apart from `now`.
pub fn compose(
    cfg: &WriterConfig,
    period_key: &str,
    pool: &[ContentItem],
    now: DateTime<Utc>,
) -> Result<NewsletterArtifact> {
    validate_period_key(period_key)?;
    let available = pool.iter().filter(|it| it.is_candidate()).count();
    if available < cfg.min_items {
        return Err(PipelineError::InsufficientContent {
            available,
            required: cfg.min_items,
        });
    }

    let ranked = select::select_top(pool, cfg.max_items);
    let sections = select::group_sections(&ranked);
    let high = ranked
        .iter()
        .filter(|it| it.business_impact == Some(BusinessImpact::High))
        .count();
    let summary = executive_summary(&ranked, &sections, high);
    let metrics = newsletter_metrics(&ranked, &summary);
    let subject_variants =
        subject::subject_variants(period_key, cfg.subject_seed, &ranked, &metrics);

    let input = RenderInput {
        period_key,
        summary: &summary,
        sections: &sections,
        metrics: &metrics,
    };
    let html_body = render::render_html(&input);
    let text_body = render::render_text(&input);

    Ok(NewsletterArtifact {
        artifact_id: artifact_id_for(period_key),
        period_key: period_key.to_string(),
        summary,
        sections,
        subject_variants,
        metrics,
        html_body,
        text_body,
        created_at: now,
    })
}

pub struct WriterAgent {
    cfg: WriterConfig,
    store: Arc<dyn ContentStore>,
    flights: SingleFlight,
}

impl WriterAgent {
    pub fn new(cfg: WriterConfig, store: Arc<dyn ContentStore>) -> Self {
        crate::metrics::ensure_metrics_described();
        Self {
            cfg,
            store,
            flights: SingleFlight::default(),
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.cfg
    }

    pub fn is_running(&self, period_key: &str) -> bool {
        self.flights.is_running(period_key)
    }

    /// Compose from a store snapshot, persist the artifact and mark its items selected.
    ///
    /// A second call for a key already in flight fails with `AlreadyRunning`;
    /// a key that already has an artifact fails with `DuplicateArtifact`.
    pub async fn compose_and_store(&self, period_key: &str) -> Result<NewsletterArtifact> {
        let _flight = self.flights.try_begin(period_key)?;
        if self.store.get_artifact(period_key).await?.is_some() {
            return Err(PipelineError::DuplicateArtifact(period_key.to_string()));
        }

        let pool = self.store.candidate_pool().await?;
        let artifact = compose(&self.cfg, period_key, &pool, Utc::now())?;
        self.store.put_artifact(artifact.clone()).await?;
        self.store.mark_selected(&artifact.item_ids()).await?;

        counter!(ARTIFACTS_PRODUCED).increment(1);
        tracing::info!(
            target: "writer",
            period_key,
            artifact_id = %artifact.artifact_id,
            articles = artifact.metrics.total_articles,
            sections = artifact.sections.len(),
            "newsletter composed"
        );
        Ok(artifact)
    }
}

#[async_trait]
impl AgentHandler for WriterAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Writer
    }

    async fn handle(&self, payload: TaskPayload) -> Result<TaskOutput> {
        let TaskPayload::Compose { period_key } = payload else {
            return Err(PipelineError::Validation(
                "writer only handles compose payloads".into(),
            ));
        };
        let artifact = self.compose_and_store(&period_key).await?;
        Ok(TaskOutput::Composed {
            artifact: Box::new(artifact),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, ItemStatus};
    use crate::store::MemoryStore;

    fn cfg(min: usize) -> WriterConfig {
        WriterConfig {
            max_items: 10,
            min_items: min,
            subject_seed: 42,
        }
    }

    fn pool() -> Vec<ContentItem> {
        let at = DateTime::parse_from_rfc3339("2024-01-16T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let specs = [
            ("Robots lay bricks <fast>", BusinessImpact::High, Category::RoboticsInConstruction),
            ("Digital twins for bridges", BusinessImpact::High, Category::BimDigitalTwins),
            ("AI scheduling assistant", BusinessImpact::Medium, Category::ProjectManagementAi),
            ("Carbon tracking with ML", BusinessImpact::Low, Category::SustainabilityGreenTech),
        ];
        specs
            .iter()
            .enumerate()
            .map(|(i, (title, impact, cat))| {
                let mut it =
                    ContentItem::discovered("s", format!("https://n.test/{i}?a=1&b=2"), *title, "", at, at);
                it.status = ItemStatus::Curated;
                it.business_impact = Some(*impact);
                it.category = Some(*cat);
                it.quality_score = Some(0.8);
                it.relevance_score = Some(0.7);
                it.summary = Some(format!("Summary {i}."));
                it
            })
            .collect()
    }

    #[test]
    fn compose_is_deterministic_apart_from_created_at() {
        let a = compose(&cfg(3), "2024-W03", &pool(), Utc::now()).unwrap();
        let mut reversed = pool();
        reversed.reverse();
        let b = compose(&cfg(3), "2024-W03", &reversed, Utc::now()).unwrap();
        assert_eq!(a.html_body, b.html_body);
        assert_eq!(a.text_body, b.text_body);
        assert_eq!(a.subject_variants, b.subject_variants);
        assert_eq!(a.artifact_id, b.artifact_id);
    }

    #[test]
    fn both_encodings_carry_every_article() {
        let a = compose(&cfg(3), "2024-W03", &pool(), Utc::now()).unwrap();
        for s in &a.sections {
            for e in &s.entries {
                assert!(a.text_body.contains(&e.title));
                assert!(a.html_body.contains(&*html_escape::encode_text(&e.title)));
            }
        }
        assert!(a.html_body.contains("&lt;fast&gt;"));
        assert!(a.html_body.contains("https://n.test/0?a=1&amp;b=2"));
        assert_eq!(a.metrics.total_articles, 4);
        assert_eq!(a.metrics.high_impact_articles, 2);
        assert_eq!(a.summary.highlights.len(), 3);
    }

    #[test]
    fn too_few_candidates_is_insufficient_content() {
        let err = compose(&cfg(5), "2024-W03", &pool(), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientContent {
                available: 4,
                required: 5
            }
        ));
    }

    #[test]
    fn single_flight_rejects_while_held() {
        let sf = SingleFlight::default();
        let g = sf.try_begin("2024-W03").unwrap();
        assert!(matches!(sf.try_begin("2024-W03"), Err(PipelineError::AlreadyRunning(_))));
        assert!(sf.try_begin("2024-W04").is_ok());
        drop(g);
        assert!(sf.try_begin("2024-W03").is_ok());
    }

    #[tokio::test]
    async fn stored_artifact_blocks_recomposition() {
        let store = Arc::new(MemoryStore::new());
        for it in pool() {
            store.insert_item(it).await.unwrap();
        }
        let writer = WriterAgent::new(cfg(3), store.clone());
        let art = writer.compose_and_store("2024-W03").await.unwrap();
        let selected = store.items_by_status(ItemStatus::Selected).await.unwrap();
        assert_eq!(selected.len(), art.metrics.total_articles);
        assert!(matches!(
            writer.compose_and_store("2024-W03").await,
            Err(PipelineError::DuplicateArtifact(_))
        ));
    }
}
