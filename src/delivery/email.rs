//! SMTP delivery: one multipart (text + HTML) message per newsletter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::DeliverySink;
use crate::model::NewsletterArtifact;

pub struct SmtpDelivery {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} missing"))
}

impl SmtpDelivery {
    /// Reads `SMTP_HOST`, `SMTP_USER`, `SMTP_PASS`, `NEWSLETTER_FROM`, `NEWSLETTER_TO`.
    pub fn from_env() -> Result<Self> {
        let host = env("SMTP_HOST")?;
        let creds = Credentials::new(env("SMTP_USER")?, env("SMTP_PASS")?);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .with_context(|| format!("invalid SMTP_HOST {host}"))?
            .credentials(creds)
            .build();

        let from = env("NEWSLETTER_FROM")?
            .parse()
            .context("invalid NEWSLETTER_FROM")?;
        let to = env("NEWSLETTER_TO")?
            .parse()
            .context("invalid NEWSLETTER_TO")?;

        Ok(Self { mailer, from, to })
    }

    /// Subject is the best-ranked variant.
    pub fn build_message(
        from: &Mailbox,
        to: &Mailbox,
        artifact: &NewsletterArtifact,
    ) -> Result<Message> {
        let subject = artifact
            .subject_variants
            .first()
            .cloned()
            .unwrap_or_else(|| format!("AEC AI Weekly {}", artifact.period_key));
        Message::builder()
            .from(from.clone())
            .to(to.clone())
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                artifact.text_body.clone(),
                artifact.html_body.clone(),
            ))
            .context("build newsletter email")
    }
}

#[async_trait]
impl DeliverySink for SmtpDelivery {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn deliver(&self, artifact: &NewsletterArtifact) -> Result<()> {
        let msg = Self::build_message(&self.from, &self.to, artifact)?;
        self.mailer.send(msg).await.context("send newsletter email")?;
        tracing::info!(
            target: "delivery",
            period_key = %artifact.period_key,
            artifact_id = %artifact.artifact_id,
            "newsletter sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutiveSummary, NewsletterMetrics};
    use chrono::Utc;

    fn artifact() -> NewsletterArtifact {
        NewsletterArtifact {
            artifact_id: "nl-1".into(),
            period_key: "2024-W03".into(),
            summary: ExecutiveSummary {
                overview: "o".into(),
                highlights: vec![],
            },
            sections: vec![],
            subject_variants: vec!["Your weekly AEC AI intelligence briefing".into()],
            metrics: NewsletterMetrics {
                total_articles: 0,
                high_impact_articles: 0,
                categories_covered: 0,
                estimated_read_minutes: 1,
                quality_score_avg: 0.0,
            },
            html_body: "<p>hello html</p>".into(),
            text_body: "hello text".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn message_is_multipart_with_top_subject() {
        let from: Mailbox = "News <news@example.com>".parse().unwrap();
        let to: Mailbox = "reader@example.com".parse().unwrap();
        let msg = SmtpDelivery::build_message(&from, &to, &artifact()).unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("Subject: Your weekly AEC AI intelligence briefing"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("hello text"));
        assert!(raw.contains("hello html"));
    }
}
