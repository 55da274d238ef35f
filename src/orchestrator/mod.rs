//! Task orchestrator: priority queue, dispatch to per-agent worker pools,
//! retry/backoff/dead-letter policy, recurring jobs and agent health.
//!
//! All queue and task-table mutations happen under one short-lived lock, so
//! `submit` may be called from anywhere while `dispatch_next` stays
//! serialized. Agent work runs on spawned tasks holding a worker permit;
//! results come back through `complete` / `fail`.

pub mod period;
pub mod queue;
pub mod registry;
pub mod scheduler;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};

use crate::backoff::Backoff;
use crate::config::PipelineConfig;
use crate::curator::{detect_trends, TrendReport};
use crate::delivery::DeliverySink;
use crate::error::{PipelineError, Result};
use crate::health::HealthState;
use crate::metrics::{
    QUEUE_DEPTH, QUEUE_OVERFLOW_DROPS, SCHEDULER_SKIPS, TASKS_DEAD, TASKS_DISPATCHED,
    TASKS_RETRIED, TASKS_SUBMITTED,
};
use crate::model::{
    validate_period_key, AgentTask, AgentType, ItemStatus, Priority, Source, TaskOutput,
    TaskPayload, TaskStatus,
};
use crate::sources::SourceRegistry;
use crate::store::ContentStore;

use queue::TaskQueue;
use registry::{AgentRegistry, Availability};
use scheduler::{JobKind, JobStatus, Scheduler};

/// Dead-letter entries kept in memory.
const DEAD_LETTER_CAPACITY: usize = 1_000;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub task_timeout: Duration,
    pub dispatch_retry_limit: u32,
    pub max_queue_depth_per_agent: usize,
    pub curation_batch_size: usize,
    pub discovery_interval: Duration,
    pub newsletter_interval: Duration,
    pub archive_sweep_interval: Duration,
    pub retention_window: Duration,
    pub scheduler_tick: Duration,
    pub health_probe_interval: Duration,
}

impl From<&PipelineConfig> for OrchestratorConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff: Backoff::new(cfg.backoff_base(), cfg.backoff_cap()),
            task_timeout: cfg.task_timeout(),
            dispatch_retry_limit: cfg.dispatch_retry_limit,
            max_queue_depth_per_agent: cfg.max_queue_depth_per_agent,
            curation_batch_size: cfg.curation_batch_size.max(1),
            discovery_interval: cfg.discovery_interval(),
            newsletter_interval: cfg.newsletter_interval(),
            archive_sweep_interval: cfg.archive_sweep_interval(),
            retention_window: cfg.retention_window(),
            scheduler_tick: cfg.scheduler_tick(),
            health_probe_interval: cfg.health_probe_interval(),
        }
    }
}

/// A task that will never run again.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub task_id: String,
    pub agent_type: AgentType,
    pub payload: TaskPayload,
    pub attempts: u32,
    pub error_kind: &'static str,
    pub error: String,
    pub died_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub orchestrator: HealthState,
    pub scout: HealthState,
    pub curator: HealthState,
    pub writer: HealthState,
    pub queued: usize,
    pub delayed: usize,
    pub running: usize,
    pub dead: usize,
    pub jobs: Vec<JobStatus>,
}

struct State {
    queue: TaskQueue,
    tasks: HashMap<String, AgentTask>,
    dead: VecDeque<DeadLetter>,
    scheduler: Scheduler,
}

impl State {
    fn bury(&mut self, task_id: &str, error_kind: &'static str, error: String) {
        let Some(task) = self.tasks.get_mut(task_id) else {
            return;
        };
        task.status = TaskStatus::Dead;
        task.last_error = Some(error.clone());
        let letter = DeadLetter {
            task_id: task.task_id.clone(),
            agent_type: task.agent_type,
            payload: task.payload.clone(),
            attempts: task.attempt_count,
            error_kind,
            error: error.clone(),
            died_at: Utc::now(),
        };
        self.queue.forget(task_id);
        if self.dead.len() == DEAD_LETTER_CAPACITY {
            self.dead.pop_front();
        }
        self.dead.push_back(letter);
        if let Some(job) = self.scheduler.owner_of(task_id) {
            self.scheduler.record_failure(job, error);
        }
        counter!(TASKS_DEAD, "kind" => error_kind).increment(1);
    }

    /// Mark tasks dropped by the depth bound as dead.
    fn bury_dropped(&mut self, dropped: Vec<String>) {
        for id in dropped {
            counter!(QUEUE_OVERFLOW_DROPS).increment(1);
            tracing::warn!(target: "orchestrator", task_id = %id, "queue full, dropping oldest task");
            self.bury(&id, "queue_overflow", "dropped: agent queue depth exceeded".into());
        }
    }

    fn compose_in_flight(&self, key: &str) -> bool {
        self.tasks.values().any(|t| {
            !t.status.is_terminal()
                && matches!(&t.payload, TaskPayload::Compose { period_key } if period_key == key)
        })
    }

    fn job_in_flight(&self, job: JobKind) -> bool {
        self.scheduler
            .job(job)
            .and_then(|j| j.last_task.as_deref())
            .and_then(|id| self.tasks.get(id))
            .is_some_and(|t| !t.status.is_terminal())
    }
}

pub struct Orchestrator {
    cfg: OrchestratorConfig,
    agents: AgentRegistry,
    sources: Arc<SourceRegistry>,
    store: Arc<dyn ContentStore>,
    delivery: Arc<dyn DeliverySink>,
    state: Mutex<State>,
    notify: Notify,
    archiving: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        cfg: OrchestratorConfig,
        agents: AgentRegistry,
        sources: Arc<SourceRegistry>,
        store: Arc<dyn ContentStore>,
        delivery: Arc<dyn DeliverySink>,
    ) -> Arc<Self> {
        crate::metrics::ensure_metrics_described();
        let queue = TaskQueue::new(cfg.max_queue_depth_per_agent);
        Arc::new(Self {
            cfg,
            agents,
            sources,
            store,
            delivery,
            state: Mutex::new(State {
                queue,
                tasks: HashMap::new(),
                dead: VecDeque::new(),
                scheduler: Scheduler::new(),
            }),
            notify: Notify::new(),
            archiving: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.cfg
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Register the discovery (fires now), newsletter and archive jobs.
    pub fn start_schedule(&self) {
        let now = Instant::now();
        let mut st = self.state.lock();
        st.scheduler
            .add(JobKind::Discovery, self.cfg.discovery_interval, now);
        st.scheduler.add(
            JobKind::Newsletter,
            self.cfg.newsletter_interval,
            now + self.cfg.newsletter_interval,
        );
        st.scheduler.add(
            JobKind::Archive,
            self.cfg.archive_sweep_interval,
            now + self.cfg.archive_sweep_interval,
        );
    }

    /// Enqueue `task`. Fails on an agent/payload mismatch, an invalid
    /// payload, or a composition already in flight for the same period.
    pub fn submit(&self, mut task: AgentTask) -> Result<String> {
        if task.agent_type != task.payload.agent_type() {
            return Err(PipelineError::Validation(format!(
                "payload '{}' cannot run on agent '{}'",
                task.payload.agent_type(),
                task.agent_type
            )));
        }
        task.payload.validate()?;
        task.status = TaskStatus::Queued;
        task.attempt_count = 0;
        task.deferrals = 0;
        task.max_attempts = task.max_attempts.max(1);

        let mut st = self.state.lock();
        if let TaskPayload::Compose { period_key } = &task.payload {
            if st.compose_in_flight(period_key) {
                return Err(PipelineError::AlreadyRunning(period_key.clone()));
            }
        }
        let id = self.enqueue(&mut st, task);
        drop(st);
        self.notify.notify_one();
        Ok(id)
    }

    pub fn submit_task(
        &self,
        agent_type: AgentType,
        priority: Priority,
        payload: TaskPayload,
    ) -> Result<String> {
        let mut task = AgentTask::new(priority, payload, self.cfg.max_attempts);
        task.agent_type = agent_type;
        self.submit(task)
    }

    fn enqueue(&self, st: &mut State, task: AgentTask) -> String {
        let id = task.task_id.clone();
        let agent = task.agent_type;
        let dropped = st.queue.push(&id, agent, task.priority, task.created_at);
        counter!(TASKS_SUBMITTED, "agent" => agent.as_str()).increment(1);
        tracing::debug!(
            target: "orchestrator",
            task_id = %id,
            agent = %agent,
            priority = task.priority.0,
            "task queued"
        );
        st.tasks.insert(id.clone(), task);
        st.bury_dropped(dropped);
        gauge!(QUEUE_DEPTH).set(st.queue.ready_len() as f64);
        id
    }

    /// Hand the most urgent eligible task to its agent.
    ///
    /// Tasks whose agent is unavailable are put back with their priority
    /// unchanged; past `dispatch_retry_limit` deferrals they are parked until
    /// the agent recovers. Returns the id of the dispatched task.
    pub fn dispatch_next(self: &Arc<Self>) -> Option<String> {
        let (task, handler, permit) = {
            let mut st = self.state.lock();
            let mut passed: Vec<AgentType> = Vec::new();
            loop {
                let agents = &self.agents;
                let id = st.queue.pop(|a| {
                    !passed.contains(&a) && agents.availability(a) != Availability::Busy
                })?;
                let agent = st.tasks.get(&id)?.agent_type;

                let claimed = match agents.availability(agent) {
                    Availability::Ready => agents
                        .try_acquire(agent)
                        .and_then(|p| agents.handler(agent).map(|h| (h, p))),
                    _ => None,
                };
                match claimed {
                    Some((handler, permit)) => {
                        let task = st.tasks.get_mut(&id)?;
                        task.status = TaskStatus::Running;
                        task.attempt_count += 1;
                        break (task.clone(), handler, permit);
                    }
                    None if agents.availability(agent) == Availability::Busy => {
                        st.queue.requeue(&id);
                        passed.push(agent);
                    }
                    None => {
                        self.defer(&mut st, &id);
                        passed.push(agent);
                    }
                }
            }
        };

        counter!(TASKS_DISPATCHED, "agent" => task.agent_type.as_str()).increment(1);
        tracing::info!(
            target: "orchestrator",
            task_id = %task.task_id,
            agent = %task.agent_type,
            attempt = task.attempt_count,
            "task dispatched"
        );

        let this = Arc::clone(self);
        let task_id = task.task_id.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let timeout = this.cfg.task_timeout;
            let res = match tokio::time::timeout(timeout, handler.handle(task.payload)).await {
                Ok(r) => r,
                Err(_) => Err(PipelineError::Timeout {
                    task_id: task.task_id.clone(),
                    after_ms: timeout.as_millis() as u64,
                }),
            };
            let outcome = match res {
                Ok(output) => this.complete(&task.task_id, output),
                Err(e) => this.fail(&task.task_id, &e).map(|_| ()),
            };
            if let Err(e) = outcome {
                tracing::warn!(target: "orchestrator", task_id = %task.task_id, error = %e, "task result not recorded");
            }
            this.notify.notify_one();
        });
        Some(task_id)
    }

    fn defer(&self, st: &mut State, task_id: &str) {
        let Some(task) = st.tasks.get_mut(task_id) else {
            return;
        };
        task.deferrals += 1;
        let agent = task.agent_type;
        if task.deferrals > self.cfg.dispatch_retry_limit {
            tracing::warn!(
                target: "orchestrator",
                task_id,
                agent = %agent,
                deferrals = task.deferrals,
                "agent unavailable, parking task"
            );
            let dropped = st.queue.park(task_id);
            st.bury_dropped(dropped);
        } else {
            tracing::debug!(target: "orchestrator", task_id, agent = %agent, "agent unavailable, deferring task");
            st.queue.requeue(task_id);
        }
    }

    /// Record success and route the output to the next stage.
    pub fn complete(&self, task_id: &str, output: TaskOutput) -> Result<()> {
        let agent = {
            let mut st = self.state.lock();
            let task = st
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| PipelineError::UnknownTask(task_id.to_string()))?;
            if task.status != TaskStatus::Running {
                return Err(PipelineError::Validation(format!(
                    "task {task_id} is not running"
                )));
            }
            task.status = TaskStatus::Succeeded;
            task.last_error = None;
            let agent = task.agent_type;
            st.queue.forget(task_id);
            if let Some(job) = st.scheduler.owner_of(task_id) {
                st.scheduler.clear_failure(job);
            }
            agent
        };
        if self.agents.record_success(agent).is_some() {
            self.unpark_recovered();
        }
        tracing::info!(target: "orchestrator", task_id, agent = %agent, "task succeeded");
        self.route(output);
        Ok(())
    }

    /// Record a failure. Retryable errors with attempts left go back to the
    /// queue after a backoff delay (`failed`); everything else is `dead`.
    pub fn fail(&self, task_id: &str, error: &PipelineError) -> Result<TaskStatus> {
        let (agent, status) = {
            let mut st = self.state.lock();
            let task = st
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| PipelineError::UnknownTask(task_id.to_string()))?;
            if task.status != TaskStatus::Running {
                return Err(PipelineError::Validation(format!(
                    "task {task_id} is not running"
                )));
            }
            let agent = task.agent_type;
            let attempts = task.attempt_count;
            if error.is_retryable() && attempts < task.max_attempts {
                task.status = TaskStatus::Failed;
                task.last_error = Some(error.to_string());
                let delay = self.cfg.backoff.delay(attempts.saturating_sub(1));
                st.queue.delay(task_id, Instant::now() + delay);
                counter!(TASKS_RETRIED, "agent" => agent.as_str()).increment(1);
                tracing::warn!(
                    target: "orchestrator",
                    task_id,
                    agent = %agent,
                    attempt = attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %error,
                    "task failed, will retry"
                );
                (agent, TaskStatus::Failed)
            } else {
                tracing::error!(
                    target: "orchestrator",
                    task_id,
                    agent = %agent,
                    attempts,
                    error = %error,
                    "task dead"
                );
                st.bury(task_id, error.kind(), error.to_string());
                (agent, TaskStatus::Dead)
            }
        };
        if error.is_retryable() {
            self.agents.record_failure(agent);
        }
        Ok(status)
    }

    fn route(&self, output: TaskOutput) {
        match output {
            TaskOutput::Discovered { item_ids } => {
                for chunk in item_ids.chunks(self.cfg.curation_batch_size) {
                    let payload = TaskPayload::Curate {
                        item_ids: chunk.to_vec(),
                    };
                    if let Err(e) = self.submit_task(AgentType::Curator, Priority::MEDIUM, payload) {
                        tracing::warn!(target: "orchestrator", error = %e, "curation task not queued");
                    }
                }
            }
            TaskOutput::Curated { curated, rejected } => {
                tracing::debug!(target: "orchestrator", curated, rejected, "curation batch done");
            }
            TaskOutput::Composed { artifact } => {
                let sink = Arc::clone(&self.delivery);
                tokio::spawn(async move {
                    if let Err(e) = sink.deliver(&artifact).await {
                        tracing::error!(
                            target: "delivery",
                            sink = sink.name(),
                            period_key = %artifact.period_key,
                            error = %e,
                            "newsletter delivery failed"
                        );
                    }
                });
            }
        }
    }

    /// Return parked tasks to the queue for agents that are no longer paused.
    fn unpark_recovered(&self) {
        let mut st = self.state.lock();
        for agent in AgentType::ALL {
            if st.queue.parked_len(agent) > 0
                && self.agents.availability(agent) != Availability::Unavailable
            {
                let n = st.queue.unpark(agent);
                tracing::info!(target: "orchestrator", agent = %agent, tasks = n, "agent recovered, unparking tasks");
            }
        }
    }

    pub fn get_task_status(&self, task_id: &str) -> Result<AgentTask> {
        self.state
            .lock()
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownTask(task_id.to_string()))
    }

    /// Failed-task log, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().dead.iter().cloned().collect()
    }

    pub fn health_check(&self) -> HealthReport {
        let st = self.state.lock();
        let jobs = st.scheduler.statuses(Instant::now());
        let orchestrator = if jobs.iter().any(|j| j.last_failure.is_some()) {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };
        let count = |s: TaskStatus| st.tasks.values().filter(|t| t.status == s).count();
        HealthReport {
            orchestrator,
            scout: self.agents.health(AgentType::Scout),
            curator: self.agents.health(AgentType::Curator),
            writer: self.agents.health(AgentType::Writer),
            queued: count(TaskStatus::Queued),
            delayed: count(TaskStatus::Failed),
            running: count(TaskStatus::Running),
            dead: count(TaskStatus::Dead),
            jobs,
        }
    }

    pub fn get_source_metrics(&self) -> Vec<Source> {
        self.sources.snapshots()
    }

    /// Queue a discovery run over every source now.
    pub fn trigger_discovery(&self) -> Result<String> {
        let id = self.submit_task(
            AgentType::Scout,
            Priority::HIGH,
            TaskPayload::Discover { source_ids: vec![] },
        )?;
        self.state.lock().scheduler.adopt_task(JobKind::Discovery, &id);
        Ok(id)
    }

    /// Queue composition for `period_key`. Rejected if that period already
    /// has an artifact or a composition in flight.
    pub async fn trigger_composition(&self, period_key: &str) -> Result<String> {
        validate_period_key(period_key)?;
        if self.store.get_artifact(period_key).await?.is_some() {
            return Err(PipelineError::DuplicateArtifact(period_key.to_string()));
        }
        self.submit_task(
            AgentType::Writer,
            Priority::HIGH,
            TaskPayload::Compose {
                period_key: period_key.to_string(),
            },
        )
    }

    /// Category, tag and cluster trends over the last `days` days.
    pub async fn trends(&self, days: u32) -> Result<TrendReport> {
        let since = Utc::now() - chrono::Duration::days(i64::from(days));
        let mut items = self.store.items_by_status(ItemStatus::Curated).await?;
        items.extend(self.store.items_by_status(ItemStatus::Selected).await?);
        Ok(detect_trends(&items, since))
    }

    /// Poll every registered agent's probe once.
    pub async fn probe_agents(&self) {
        for agent in self.agents.registered() {
            let Some(handler) = self.agents.handler(agent) else {
                continue;
            };
            match tokio::time::timeout(self.cfg.health_probe_interval, handler.probe()).await {
                Ok(Ok(())) => {
                    self.agents.record_success(agent);
                }
                Ok(Err(e)) => {
                    tracing::warn!(target: "orchestrator", agent = %agent, error = %e, "agent probe failed");
                    self.agents.record_failure(agent);
                }
                Err(_) => {
                    tracing::warn!(target: "orchestrator", agent = %agent, "agent probe timed out");
                    self.agents.record_failure(agent);
                }
            }
        }
        self.unpark_recovered();
    }

    /// One control-loop step: promote backed-off tasks, fire due jobs,
    /// dispatch until no worker or task is left. Returns tasks dispatched.
    pub async fn tick(self: &Arc<Self>) -> usize {
        let now = Instant::now();
        let due = {
            let mut st = self.state.lock();
            for id in st.queue.promote_due(now) {
                if let Some(t) = st.tasks.get_mut(&id) {
                    t.status = TaskStatus::Queued;
                }
            }
            let fired = st.scheduler.due(now);
            fired
        };
        for job in due {
            self.fire(job).await;
        }
        self.unpark_recovered();

        let mut dispatched = 0;
        while self.dispatch_next().is_some() {
            dispatched += 1;
        }
        gauge!(QUEUE_DEPTH).set(self.state.lock().queue.ready_len() as f64);
        dispatched
    }

    async fn fire(self: &Arc<Self>, job: JobKind) {
        if self.state.lock().job_in_flight(job) {
            counter!(SCHEDULER_SKIPS, "job" => job.as_str()).increment(1);
            tracing::info!(target: "scheduler", job = job.as_str(), "previous run still in flight, skipping");
            self.state.lock().scheduler.record_skip(job);
            return;
        }

        let task = match job {
            JobKind::Discovery => self.submit_task(
                AgentType::Scout,
                Priority::MEDIUM,
                TaskPayload::Discover { source_ids: vec![] },
            ),
            JobKind::Newsletter => {
                let key = period::period_key_for(Utc::now(), self.cfg.newsletter_interval);
                self.trigger_composition(&key).await
            }
            JobKind::Archive => {
                self.spawn_archive_sweep();
                self.state.lock().scheduler.record_fire(job, None);
                return;
            }
        };

        match task {
            Ok(id) => {
                tracing::info!(target: "scheduler", job = job.as_str(), task_id = %id, "job fired");
                self.state.lock().scheduler.record_fire(job, Some(id));
            }
            Err(e @ (PipelineError::AlreadyRunning(_) | PipelineError::DuplicateArtifact(_))) => {
                counter!(SCHEDULER_SKIPS, "job" => job.as_str()).increment(1);
                tracing::info!(target: "scheduler", job = job.as_str(), reason = %e, "job skipped");
                self.state.lock().scheduler.record_skip(job);
            }
            Err(e) => {
                tracing::error!(target: "scheduler", job = job.as_str(), error = %e, "job could not fire");
                self.state.lock().scheduler.record_failure(job, e.to_string());
            }
        }
    }

    fn spawn_archive_sweep(&self) {
        if self.archiving.swap(true, Ordering::SeqCst) {
            counter!(SCHEDULER_SKIPS, "job" => "archive").increment(1);
            return;
        }
        let retention = chrono::Duration::from_std(self.cfg.retention_window)
            .unwrap_or_else(|_| chrono::Duration::days(30));
        let store = Arc::clone(&self.store);
        let cutoff = Utc::now() - retention;
        let flag = Arc::clone(&self.archiving);
        tokio::spawn(async move {
            match store.archive_older_than(cutoff).await {
                Ok(n) => tracing::info!(target: "scheduler", archived = n, %cutoff, "archive sweep done"),
                Err(e) => tracing::error!(target: "scheduler", error = %e, "archive sweep failed"),
            }
            flag.store(false, Ordering::SeqCst);
        });
    }

    /// Control loop: ticks on the scheduler cadence and whenever work
    /// arrives or finishes, probes agents on the health interval, and exits
    /// when `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.cfg.scheduler_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut probe = tokio::time::interval(self.cfg.health_probe_interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(target: "orchestrator", agents = ?self.agents.registered(), "control loop started");
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.tick().await;
                }
                _ = probe.tick() => {
                    self.probe_agents().await;
                }
                _ = self.notify.notified() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(target: "orchestrator", "control loop stopped");
    }
}
