use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Category;
use crate::health::HealthState;

/// A polled feed/endpoint with its reliability metrics.
///
/// This is the snapshot view handed to collaborators; the live counters sit
/// behind the per-source lock in [`crate::sources::SourceRegistry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    pub url: String,
    pub category_hint: Option<Category>,
    /// Trust weight in [0,1] fed into the quality score.
    pub credibility_weight: f32,
    pub min_request_interval_ms: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub health: HealthState,
    /// Share of successful polls over the rolling window, in [0,1].
    pub success_rate: f32,
    pub avg_response_time_ms: f64,
    pub total_polls: u64,
    pub total_items_discovered: u64,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Source {
    pub fn new(
        source_id: impl Into<String>,
        url: impl Into<String>,
        category_hint: Option<Category>,
        credibility_weight: f32,
        min_request_interval_ms: u64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            url: url.into(),
            category_hint,
            credibility_weight: credibility_weight.clamp(0.0, 1.0),
            min_request_interval_ms,
            consecutive_failures: 0,
            consecutive_successes: 0,
            health: HealthState::Healthy,
            success_rate: 0.0,
            avg_response_time_ms: 0.0,
            total_polls: 0,
            total_items_discovered: 0,
            last_polled_at: None,
            last_success_at: None,
            last_error: None,
        }
    }
}

/// The slice of a source the curator needs for scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceProfile {
    pub credibility_weight: f32,
    pub category_hint: Option<Category>,
}

impl Default for SourceProfile {
    fn default() -> Self {
        Self {
            credibility_weight: 0.5,
            category_hint: None,
        }
    }
}

impl From<&Source> for SourceProfile {
    fn from(s: &Source) -> Self {
        Self {
            credibility_weight: s.credibility_weight,
            category_hint: s.category_hint,
        }
    }
}
