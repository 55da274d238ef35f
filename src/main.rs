//! AEC news pipeline server entrypoint.
//! Boots config, tracing and metrics, assembles the agents and orchestrator,
//! runs the control loop and serves the HTTP API until Ctrl-C.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use aec_news_pipeline::delivery::{DeliverySink, Outbox, SmtpDelivery};
use aec_news_pipeline::metrics::Metrics;
use aec_news_pipeline::scout::fetch::HttpFetcher;
use aec_news_pipeline::sources::CredibilityTable;
use aec_news_pipeline::store::MemoryStore;
use aec_news_pipeline::{create_router, telemetry, Pipeline, PipelineConfig};

const CREDIBILITY_TABLE_PATH: &str = "config/credibility.json";

/// SMTP when fully configured, otherwise the in-memory outbox.
fn delivery_from_env() -> Arc<dyn DeliverySink> {
    if std::env::var("SMTP_HOST").is_err() {
        return Arc::new(Outbox::new());
    }
    match SmtpDelivery::from_env() {
        Ok(smtp) => Arc::new(smtp),
        Err(e) => {
            tracing::warn!(error = ?e, "SMTP delivery not configured, using in-memory outbox");
            Arc::new(Outbox::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let metrics = Metrics::init()?;
    let cfg = PipelineConfig::load_default()?;
    let credibility = if Path::new(CREDIBILITY_TABLE_PATH).exists() {
        CredibilityTable::load_from_file(CREDIBILITY_TABLE_PATH)
    } else {
        CredibilityTable::default()
    };

    let fetcher = Arc::new(HttpFetcher::new(cfg.poll_timeout()).context("http client")?);
    let pipeline = Pipeline::build(
        &cfg,
        &credibility,
        fetcher,
        Arc::new(MemoryStore::new()),
        delivery_from_env(),
    );
    let orchestrator = pipeline.orchestrator.clone();
    orchestrator.start_schedule();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let control = tokio::spawn(orchestrator.clone().run(shutdown_rx));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("bind port {port}"))?;
    tracing::info!(port, sources = cfg.sources.len(), "serving");

    let app = create_router(orchestrator, Some(metrics));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("http server")?;

    let _ = shutdown_tx.send(true);
    control.await.context("control loop")?;
    Ok(())
}
