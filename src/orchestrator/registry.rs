//! Agent handler table keyed by `AgentType`.
//!
//! Agents never hold the orchestrator and the orchestrator never holds an
//! agent's concrete type: both meet here, through `Arc<dyn AgentHandler>`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::Result;
use crate::health::{HealthState, HealthThresholds, HealthTracker, Transition};
use crate::model::{AgentType, TaskOutput, TaskPayload};

#[async_trait]
pub trait AgentHandler: Send + Sync {
    fn agent_type(&self) -> AgentType;

    async fn handle(&self, payload: TaskPayload) -> Result<TaskOutput>;

    /// Liveness check polled by the health supervisor.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

struct AgentSlot {
    handler: Arc<dyn AgentHandler>,
    workers: Arc<Semaphore>,
    worker_count: usize,
    health: Mutex<HealthTracker>,
}

/// Why a task cannot be handed to its agent right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Ready,
    /// Every worker is busy; the task just waits its turn.
    Busy,
    /// No handler registered, or the agent is paused.
    Unavailable,
}

pub struct AgentRegistry {
    slots: BTreeMap<AgentType, AgentSlot>,
    thresholds: HealthThresholds,
}

impl AgentRegistry {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            slots: BTreeMap::new(),
            thresholds,
        }
    }

    /// Register `handler` with a pool of `workers` concurrent executions.
    pub fn register(&mut self, handler: Arc<dyn AgentHandler>, workers: usize) -> &mut Self {
        let workers = workers.max(1);
        self.slots.insert(
            handler.agent_type(),
            AgentSlot {
                handler,
                workers: Arc::new(Semaphore::new(workers)),
                worker_count: workers,
                health: Mutex::new(HealthTracker::new(self.thresholds)),
            },
        );
        self
    }

    pub fn handler(&self, agent: AgentType) -> Option<Arc<dyn AgentHandler>> {
        self.slots.get(&agent).map(|s| s.handler.clone())
    }

    pub fn registered(&self) -> Vec<AgentType> {
        self.slots.keys().copied().collect()
    }

    pub fn availability(&self, agent: AgentType) -> Availability {
        match self.slots.get(&agent) {
            None => Availability::Unavailable,
            Some(s) if s.health.lock().state() == HealthState::Paused => Availability::Unavailable,
            Some(s) if s.workers.available_permits() == 0 => Availability::Busy,
            Some(_) => Availability::Ready,
        }
    }

    /// Claim a worker; the permit is released when the execution ends.
    pub fn try_acquire(&self, agent: AgentType) -> Option<OwnedSemaphorePermit> {
        self.slots
            .get(&agent)
            .and_then(|s| s.workers.clone().try_acquire_owned().ok())
    }

    pub fn busy_workers(&self, agent: AgentType) -> usize {
        self.slots
            .get(&agent)
            .map(|s| s.worker_count - s.workers.available_permits())
            .unwrap_or(0)
    }

    /// Unregistered agents report `Paused`.
    pub fn health(&self, agent: AgentType) -> HealthState {
        self.slots
            .get(&agent)
            .map(|s| s.health.lock().state())
            .unwrap_or(HealthState::Paused)
    }

    pub fn record_success(&self, agent: AgentType) -> Option<Transition> {
        let t = self.slots.get(&agent)?.health.lock().record_success();
        log_transition(agent, t);
        t
    }

    pub fn record_failure(&self, agent: AgentType) -> Option<Transition> {
        let t = self.slots.get(&agent)?.health.lock().record_failure();
        log_transition(agent, t);
        t
    }
}

fn log_transition(agent: AgentType, t: Option<Transition>) {
    if let Some(t) = t {
        tracing::warn!(
            target: "orchestrator",
            agent = %agent,
            from = t.from.as_str(),
            to = t.to.as_str(),
            "agent health changed"
        );
    }
}
