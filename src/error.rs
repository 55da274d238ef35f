//! Error taxonomy shared by the agents and the orchestrator.

use crate::model::AgentType;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Network failure, timeout or non-2xx response while polling a source.
    #[error("transient source error ({source_id}): {message}")]
    TransientSource { source_id: String, message: String },

    /// Malformed feed content.
    #[error("parse error ({source_id}): {message}")]
    Parse { source_id: String, message: String },

    /// Malformed task: unknown agent type, payload/agent mismatch, empty fields.
    #[error("invalid task: {0}")]
    Validation(String),

    #[error("insufficient content: {available} candidate items, need {required}")]
    InsufficientContent { available: usize, required: usize },

    #[error("composition for period {0} is already running")]
    AlreadyRunning(String),

    #[error("agent {0} is unavailable")]
    AgentUnavailable(AgentType),

    #[error("newsletter for period {0} already exists")]
    DuplicateArtifact(String),

    #[error("task {task_id} timed out after {after_ms}ms")]
    Timeout { task_id: String, after_ms: u64 },

    #[error("unknown task {0}")]
    UnknownTask(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Whether a task failing with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Validation(_)
                | PipelineError::InsufficientContent { .. }
                | PipelineError::AlreadyRunning(_)
                | PipelineError::DuplicateArtifact(_)
                | PipelineError::Parse { .. }
        )
    }

    /// Short machine-readable kind, used as a metrics label and in the dead-letter log.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::TransientSource { .. } => "transient_source",
            PipelineError::Parse { .. } => "parse",
            PipelineError::Validation(_) => "validation",
            PipelineError::InsufficientContent { .. } => "insufficient_content",
            PipelineError::AlreadyRunning(_) => "already_running",
            PipelineError::AgentUnavailable(_) => "agent_unavailable",
            PipelineError::DuplicateArtifact(_) => "duplicate_artifact",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::UnknownTask(_) => "unknown_task",
            PipelineError::Store(_) => "store",
            PipelineError::Other(_) => "other",
        }
    }
}
