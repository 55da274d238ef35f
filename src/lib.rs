// src/lib.rs
// Public library surface for the server binary and integration tests.

pub mod api;
pub mod backoff;
pub mod config;
pub mod curator;
pub mod delivery;
pub mod error;
pub mod health;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod scout;
pub mod sources;
pub mod store;
pub mod telemetry;
pub mod writer;

// ---- Re-exports for a stable public API ----
pub use crate::api::create_router;
pub use crate::config::PipelineConfig;
pub use crate::error::{PipelineError, Result};
pub use crate::orchestrator::Orchestrator;
pub use crate::pipeline::Pipeline;
