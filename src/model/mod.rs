//! Domain records shared by the agents, the orchestrator and the store.

pub mod artifact;
pub mod item;
pub mod source;
pub mod task;

pub use artifact::{ExecutiveSummary, NewsletterArtifact, NewsletterMetrics, Section, SectionEntry};
pub use item::{BusinessImpact, Category, ContentItem, ItemStatus, RejectReason};
pub use source::{Source, SourceProfile};
pub use task::{
    validate_period_key, AgentTask, AgentType, Priority, TaskOutput, TaskPayload, TaskStatus,
};
