use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BusinessImpact, Category};

/// One article as it appears in a newsletter section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub item_id: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub business_impact: BusinessImpact,
    pub quality_score: f32,
    pub relevance_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub category: Category,
    pub heading: String,
    pub entries: Vec<SectionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub overview: String,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterMetrics {
    pub total_articles: usize,
    pub high_impact_articles: usize,
    pub categories_covered: usize,
    pub estimated_read_minutes: usize,
    pub quality_score_avg: f32,
}

/// Writer output. Immutable once created; one per `period_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterArtifact {
    pub artifact_id: String,
    pub period_key: String,
    pub summary: ExecutiveSummary,
    pub sections: Vec<Section>,
    /// Candidate subject lines, best first.
    pub subject_variants: Vec<String>,
    pub metrics: NewsletterMetrics,
    pub html_body: String,
    pub text_body: String,
    pub created_at: DateTime<Utc>,
}

impl NewsletterArtifact {
    pub fn item_ids(&self) -> Vec<String> {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter().map(|e| e.item_id.clone()))
            .collect()
    }
}
