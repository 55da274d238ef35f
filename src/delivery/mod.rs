//! Hand-off of finished newsletters to whatever sends them.

pub mod email;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::model::NewsletterArtifact;

pub use email::SmtpDelivery;

#[async_trait]
pub trait DeliverySink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, artifact: &NewsletterArtifact) -> anyhow::Result<()>;
}

/// Keeps delivered artifacts in memory. Default sink and test double.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<NewsletterArtifact>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<NewsletterArtifact> {
        self.sent.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

#[async_trait]
impl DeliverySink for Outbox {
    fn name(&self) -> &'static str {
        "outbox"
    }

    async fn deliver(&self, artifact: &NewsletterArtifact) -> anyhow::Result<()> {
        self.sent.lock().push(artifact.clone());
        Ok(())
    }
}
