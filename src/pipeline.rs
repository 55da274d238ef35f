//! Wiring: builds the source registry, the three agents and the orchestrator
//! from one `PipelineConfig`.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::curator::CuratorAgent;
use crate::delivery::DeliverySink;
use crate::orchestrator::registry::AgentRegistry;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::scout::fetch::FeedFetcher;
use crate::scout::{ScoutAgent, ScoutConfig};
use crate::sources::{CredibilityTable, SourceRegistry};
use crate::store::ContentStore;
use crate::writer::{WriterAgent, WriterConfig};

pub struct Pipeline {
    pub orchestrator: Arc<Orchestrator>,
    pub sources: Arc<SourceRegistry>,
    pub store: Arc<dyn ContentStore>,
    pub scout: Arc<ScoutAgent>,
    pub curator: Arc<CuratorAgent>,
    pub writer: Arc<WriterAgent>,
}

impl Pipeline {
    pub fn build(
        cfg: &PipelineConfig,
        credibility: &CredibilityTable,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn ContentStore>,
        delivery: Arc<dyn DeliverySink>,
    ) -> Self {
        let sources = Arc::new(SourceRegistry::from_config(cfg, credibility));
        let scout = Arc::new(ScoutAgent::new(
            ScoutConfig::from(cfg),
            sources.clone(),
            fetcher,
            store.clone(),
        ));
        let curator = Arc::new(CuratorAgent::with_keyword_model(
            cfg,
            sources.clone(),
            store.clone(),
        ));
        let writer = Arc::new(WriterAgent::new(WriterConfig::from(cfg), store.clone()));

        let mut agents = AgentRegistry::new(cfg.health_thresholds());
        agents
            .register(scout.clone(), cfg.scout_workers)
            .register(curator.clone(), cfg.curator_workers)
            .register(writer.clone(), cfg.writer_workers);

        let orchestrator = Orchestrator::new(
            OrchestratorConfig::from(cfg),
            agents,
            sources.clone(),
            store.clone(),
            delivery,
        );
        tracing::info!(
            target: "pipeline",
            sources = sources.len(),
            "pipeline assembled"
        );

        Self {
            orchestrator,
            sources,
            store,
            scout,
            curator,
            writer,
        }
    }
}
