//! Minimum inter-request spacing for one source.
//!
//! `reserve` hands out request slots at least `interval` apart. A caller that
//! arrives early gets a slot in the future and waits for it; requests are
//! deferred, never dropped.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    next_allowed: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_allowed: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Claim the next slot at or after `now`.
    pub fn reserve(&mut self, now: Instant) -> Instant {
        let slot = match self.next_allowed {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next_allowed = Some(slot + self.interval);
        slot
    }
}
