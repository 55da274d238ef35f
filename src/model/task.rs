// src/model/task.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::NewsletterArtifact;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Scout,
    Curator,
    Writer,
}

impl AgentType {
    pub const ALL: [AgentType; 3] = [AgentType::Scout, AgentType::Curator, AgentType::Writer];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Scout => "scout",
            AgentType::Curator => "curator",
            AgentType::Writer => "writer",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scout" => Ok(AgentType::Scout),
            "curator" => Ok(AgentType::Curator),
            "writer" => Ok(AgentType::Writer),
            other => Err(PipelineError::Validation(format!(
                "unrecognized agent type '{other}'"
            ))),
        }
    }
}

/// Task urgency; numerically lower values are dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    pub const CRITICAL: Priority = Priority(0);
    pub const HIGH: Priority = Priority(1);
    pub const MEDIUM: Priority = Priority(5);
    pub const LOW: Priority = Priority(7);
    pub const BACKGROUND: Priority = Priority(9);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::MEDIUM
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    /// Failed, waiting out its backoff before becoming eligible again.
    Failed,
    /// Retries exhausted or a non-retryable error; never re-queued.
    Dead,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Dead)
    }
}

/// Typed task input, one variant per agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Poll the given sources (all registered sources when empty).
    Discover {
        #[serde(default)]
        source_ids: Vec<String>,
    },
    Curate { item_ids: Vec<String> },
    Compose { period_key: String },
    /// Fetch one article page and admit it like a discovered item.
    Scrape { url: String },
}

impl TaskPayload {
    pub fn agent_type(&self) -> AgentType {
        match self {
            TaskPayload::Discover { .. } => AgentType::Scout,
            TaskPayload::Curate { .. } => AgentType::Curator,
            TaskPayload::Compose { .. } => AgentType::Writer,
            TaskPayload::Scrape { .. } => AgentType::Scout,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            TaskPayload::Discover { source_ids } => {
                if source_ids.iter().any(|s| s.trim().is_empty()) {
                    return Err(PipelineError::Validation(
                        "discover payload contains an empty source id".into(),
                    ));
                }
            }
            TaskPayload::Curate { item_ids } => {
                if item_ids.is_empty() {
                    return Err(PipelineError::Validation(
                        "curate payload needs at least one item id".into(),
                    ));
                }
                if item_ids.iter().any(|s| s.trim().is_empty()) {
                    return Err(PipelineError::Validation(
                        "curate payload contains an empty item id".into(),
                    ));
                }
            }
            TaskPayload::Compose { period_key } => validate_period_key(period_key)?,
            TaskPayload::Scrape { url } => {
                let url = url.trim();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(PipelineError::Validation(format!(
                        "scrape payload needs an http(s) url, got '{url}'"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Period keys are short tokens like `2024-W03` or `2024-01-16`.
pub fn validate_period_key(key: &str) -> Result<(), PipelineError> {
    let ok = !key.is_empty()
        && key.len() <= 32
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'));
    if ok {
        Ok(())
    } else {
        Err(PipelineError::Validation(format!(
            "invalid period key '{key}'"
        )))
    }
}

/// What an agent hands back to the orchestrator on success.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOutput {
    Discovered { item_ids: Vec<String> },
    Curated { curated: usize, rejected: usize },
    Composed { artifact: Box<NewsletterArtifact> },
}

/// Unit of orchestrator-dispatched work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentTask {
    pub task_id: String,
    pub agent_type: AgentType,
    pub priority: Priority,
    pub payload: TaskPayload,
    pub created_at: DateTime<Utc>,
    /// Handler executions so far; never exceeds `max_attempts`.
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub status: TaskStatus,
    /// Times the task was put back because its agent was unavailable.
    pub deferrals: u32,
    pub last_error: Option<String>,
}

impl AgentTask {
    pub fn new(priority: Priority, payload: TaskPayload, max_attempts: u32) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            agent_type: payload.agent_type(),
            priority,
            payload,
            created_at: Utc::now(),
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            status: TaskStatus::Queued,
            deferrals: 0,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_agent_type_is_a_validation_error() {
        let err = "editor".parse::<AgentType>().unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!("Curator".parse::<AgentType>().unwrap(), AgentType::Curator);
    }

    #[test]
    fn payload_validation() {
        assert!(TaskPayload::Curate { item_ids: vec![] }.validate().is_err());
        assert!(TaskPayload::Compose {
            period_key: "2024 W03".into()
        }
        .validate()
        .is_err());
        assert!(TaskPayload::Compose {
            period_key: "2024-W03".into()
        }
        .validate()
        .is_ok());
        assert!(TaskPayload::Discover { source_ids: vec![] }.validate().is_ok());
        assert!(TaskPayload::Scrape {
            url: "ftp://news.test/a".into()
        }
        .validate()
        .is_err());
        let scrape: TaskPayload =
            serde_json::from_str(r#"{"type":"scrape","url":"https://news.test/a"}"#).unwrap();
        assert!(scrape.validate().is_ok());
        assert_eq!(scrape.agent_type(), AgentType::Scout);
    }

    #[test]
    fn payload_json_is_tagged() {
        let p: TaskPayload =
            serde_json::from_str(r#"{"type":"compose","period_key":"2024-W03"}"#).unwrap();
        assert_eq!(p.agent_type(), AgentType::Writer);
        assert!(serde_json::from_str::<TaskPayload>(r#"{"type":"translate"}"#).is_err());
    }

    #[test]
    fn lower_priority_value_sorts_first() {
        assert!(Priority::HIGH < Priority::MEDIUM);
        assert!(Priority(1) < Priority(5));
    }
}
