//! Recurring jobs advanced by the control loop's tick.
//!
//! Firing only appends work; it never touches tasks already queued. Missed
//! fires (a long pause between ticks) collapse into one.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Discovery,
    Newsletter,
    Archive,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Discovery => "discovery",
            JobKind::Newsletter => "newsletter",
            JobKind::Archive => "archive",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecurringJob {
    pub kind: JobKind,
    pub cadence: Duration,
    pub next_fire: Instant,
    /// Task enqueued by the latest firing.
    pub last_task: Option<String>,
    pub fired: u64,
    pub skipped: u64,
    /// Error of the latest firing whose task ended up dead.
    pub last_failure: Option<String>,
}

/// Read-only view for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: &'static str,
    pub cadence_secs: u64,
    pub next_fire_in_secs: u64,
    pub fired: u64,
    pub skipped: u64,
    pub last_failure: Option<String>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    jobs: Vec<RecurringJob>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a job; its first fire is `first_fire`.
    pub fn add(&mut self, kind: JobKind, cadence: Duration, first_fire: Instant) {
        self.jobs.retain(|j| j.kind != kind);
        self.jobs.push(RecurringJob {
            kind,
            cadence: cadence.max(Duration::from_millis(1)),
            next_fire: first_fire,
            last_task: None,
            fired: 0,
            skipped: 0,
            last_failure: None,
        });
    }

    /// Jobs whose fire time has come. Each is advanced past `now`.
    pub fn due(&mut self, now: Instant) -> Vec<JobKind> {
        let mut fired = Vec::new();
        for job in self.jobs.iter_mut().filter(|j| j.next_fire <= now) {
            while job.next_fire <= now {
                job.next_fire += job.cadence;
            }
            fired.push(job.kind);
        }
        fired
    }

    pub fn job(&self, kind: JobKind) -> Option<&RecurringJob> {
        self.jobs.iter().find(|j| j.kind == kind)
    }

    fn job_mut(&mut self, kind: JobKind) -> Option<&mut RecurringJob> {
        self.jobs.iter_mut().find(|j| j.kind == kind)
    }

    pub fn record_fire(&mut self, kind: JobKind, task_id: Option<String>) {
        if let Some(j) = self.job_mut(kind) {
            j.fired += 1;
            if task_id.is_some() {
                j.last_task = task_id;
            }
        }
    }

    pub fn record_skip(&mut self, kind: JobKind) {
        if let Some(j) = self.job_mut(kind) {
            j.skipped += 1;
        }
    }

    /// Attach `task_id` to `kind` without counting a fire (manual triggers).
    pub fn adopt_task(&mut self, kind: JobKind, task_id: &str) {
        if let Some(j) = self.job_mut(kind) {
            j.last_task = Some(task_id.to_string());
        }
    }

    /// Job owning `task_id` as its latest task, if any.
    pub fn owner_of(&self, task_id: &str) -> Option<JobKind> {
        self.jobs
            .iter()
            .find(|j| j.last_task.as_deref() == Some(task_id))
            .map(|j| j.kind)
    }

    pub fn record_failure(&mut self, kind: JobKind, error: String) {
        if let Some(j) = self.job_mut(kind) {
            j.last_failure = Some(error);
        }
    }

    pub fn clear_failure(&mut self, kind: JobKind) {
        if let Some(j) = self.job_mut(kind) {
            j.last_failure = None;
        }
    }

    pub fn statuses(&self, now: Instant) -> Vec<JobStatus> {
        self.jobs
            .iter()
            .map(|j| JobStatus {
                job_id: j.kind.as_str(),
                cadence_secs: j.cadence.as_secs(),
                next_fire_in_secs: j.next_fire.saturating_duration_since(now).as_secs(),
                fired: j.fired,
                skipped: j.skipped,
                last_failure: j.last_failure.clone(),
            })
            .collect()
    }
}
