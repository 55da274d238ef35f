//! Exponential backoff with bounded jitter.
//!
//! `delay(attempt) = min(base * 2^attempt + jitter, cap)`, jitter uniform in
//! `[0, base * 2^attempt / 4]`. The jitter ceiling stays below the doubling
//! step, so delays strictly increase per attempt until they hit `cap`.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            cap: cap.max(base),
        }
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay before the attempt following failure number `attempt` (0-based), without jitter.
    pub fn nominal(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map(|d| d.min(self.cap))
            .unwrap_or(self.cap)
    }

    pub fn delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal(attempt);
        if nominal >= self.cap {
            return self.cap;
        }
        let max_jitter_ms = (nominal.as_millis() / 4) as u64;
        let jitter = if max_jitter_ms == 0 {
            0
        } else {
            rng.random_range(0..=max_jitter_ms)
        };
        (nominal + Duration::from_millis(jitter)).min(self.cap)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::rng())
    }
}
