//! Network side of a poll: fetch a feed document or an article page.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{PipelineError, Result};

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the raw document behind `url`.
    async fn fetch(&self, source_id: &str, url: &str) -> Result<String>;

    /// Fetch the HTML page of one article. Same transport as feeds by default.
    async fn fetch_article(&self, source_id: &str, url: &str) -> Result<String> {
        self.fetch(source_id, url).await
    }
}

/// reqwest-backed fetcher. Non-2xx responses and transport errors are transient.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("aec-news-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Other(e.into()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, source_id: &str, url: &str) -> Result<String> {
        let transient = |message: String| PipelineError::TransientSource {
            source_id: source_id.to_string(),
            message,
        };
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(transient(format!("http status {status}")));
        }
        resp.text().await.map_err(|e| transient(e.to_string()))
    }
}

/// Serves canned documents by URL; unknown URLs fail as transient errors.
#[derive(Default)]
pub struct StaticFetcher {
    docs: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.docs.insert(url.into(), body.into());
        self
    }
}

#[async_trait]
impl FeedFetcher for StaticFetcher {
    async fn fetch(&self, source_id: &str, url: &str) -> Result<String> {
        self.docs
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::TransientSource {
                source_id: source_id.to_string(),
                message: format!("no document for {url}"),
            })
    }
}
