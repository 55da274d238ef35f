//! Healthy/degraded/paused state machine driven by consecutive outcomes.
//!
//! Shared by sources (poll outcomes) and agents (probe and task outcomes):
//! - `healthy -> degraded` once consecutive failures reach K
//! - `degraded -> paused` once consecutive failures reach K+M
//! - any success resets the failure streak; a success while paused resumes
//!   at `degraded`, and N consecutive successes return to `healthy`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Paused,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Paused => "paused",
        }
    }
}

/// K, M and N of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    pub failure: u32,
    pub pause: u32,
    pub recovery: u32,
}

impl HealthThresholds {
    pub fn new(failure: u32, pause: u32, recovery: u32) -> Self {
        Self {
            failure: failure.max(1),
            pause,
            recovery: recovery.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    thresholds: HealthThresholds,
    state: HealthState,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

impl HealthTracker {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            state: HealthState::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn record_success(&mut self) -> Option<Transition> {
        self.consecutive_failures = 0;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);

        let next = match self.state {
            HealthState::Healthy => HealthState::Healthy,
            _ if self.consecutive_successes >= self.thresholds.recovery => HealthState::Healthy,
            HealthState::Paused => HealthState::Degraded,
            HealthState::Degraded => HealthState::Degraded,
        };
        self.move_to(next)
    }

    pub fn record_failure(&mut self) -> Option<Transition> {
        self.consecutive_successes = 0;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let k = self.thresholds.failure;
        let pause_at = k.saturating_add(self.thresholds.pause);
        let next = if self.consecutive_failures >= pause_at {
            HealthState::Paused
        } else if self.consecutive_failures >= k {
            // A paused tracker that failed its probe stays paused.
            match self.state {
                HealthState::Paused => HealthState::Paused,
                _ => HealthState::Degraded,
            }
        } else {
            self.state
        };
        self.move_to(next)
    }

    fn move_to(&mut self, next: HealthState) -> Option<Transition> {
        if next == self.state {
            return None;
        }
        let t = Transition {
            from: self.state,
            to: next,
        };
        self.state = next;
        Some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> HealthTracker {
        HealthTracker::new(HealthThresholds::new(3, 2, 2))
    }

    #[test]
    fn pauses_after_k_plus_m_failures() {
        let mut t = tracker();
        t.record_failure();
        t.record_failure();
        assert_eq!(t.state(), HealthState::Healthy);
        let tr = t.record_failure().unwrap();
        assert_eq!((tr.from, tr.to), (HealthState::Healthy, HealthState::Degraded));
        assert!(t.record_failure().is_none());
        let tr = t.record_failure().unwrap();
        assert_eq!(tr.to, HealthState::Paused);
    }

    #[test]
    fn intervening_success_resets_the_streak() {
        let mut t = tracker();
        for _ in 0..4 {
            t.record_failure();
        }
        t.record_success();
        for _ in 0..4 {
            t.record_failure();
        }
        assert_ne!(t.state(), HealthState::Paused);
        t.record_failure();
        assert_eq!(t.state(), HealthState::Paused);
    }

    #[test]
    fn recovery_needs_n_consecutive_successes() {
        let mut t = tracker();
        for _ in 0..5 {
            t.record_failure();
        }
        assert_eq!(t.state(), HealthState::Paused);
        t.record_success();
        assert_eq!(t.state(), HealthState::Degraded);
        t.record_failure();
        t.record_success();
        assert_eq!(t.state(), HealthState::Degraded);
        t.record_success();
        assert_eq!(t.state(), HealthState::Healthy);
    }

    #[test]
    fn zero_pause_threshold_pauses_at_k() {
        let mut t = HealthTracker::new(HealthThresholds::new(2, 0, 1));
        t.record_failure();
        t.record_failure();
        assert_eq!(t.state(), HealthState::Paused);
    }
}
