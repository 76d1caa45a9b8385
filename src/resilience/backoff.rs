//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound for any single delay (before jitter).
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(25),
            max: Duration::from_millis(500),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based); zero for attempt 0.
    ///
    /// Doubles per attempt, is capped at `max`, then gets up to 10% jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let capped_ms = base_ms
            .saturating_mul(2u64.saturating_pow(attempt - 1))
            .min(max_ms);

        let jitter_range = capped_ms / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped_ms + jitter)
    }
}
