//! Reconnect policy: pure backoff and attempt bookkeeping, no I/O.
//!
//! The delay for attempt `n` (0-indexed) is `initial_delay * 2^n`, clamped
//! to `max_delay`. No jitter: the schedule is deterministic. Scheduling
//! itself (enabled/destroyed/attempt gating) is the state machine's job;
//! this type only answers "how long".

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectOptions {
    /// Whether the state machine schedules retries at all.
    pub enabled: bool,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap applied to the doubled delays.
    pub max_delay: Duration,
    /// Retries stop once this many have been scheduled.
    pub max_retries: u32,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(15000),
            max_retries: 10,
        }
    }
}

impl ReconnectOptions {
    /// Delay for the given attempt number (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Shifts beyond 32 cannot produce anything under any sane cap, and
        // capping the shift keeps the multiply inside u64.
        let doubled = (self.initial_delay.as_millis() as u64)
            .saturating_mul(1u64 << attempt.min(32));
        Duration::from_millis(doubled).min(self.max_delay)
    }
}
