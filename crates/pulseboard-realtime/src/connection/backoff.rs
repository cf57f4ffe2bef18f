//! Reconnect delay policy.

use std::time::Duration;

/// Fixed or doubling reconnect delay, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    exponential: bool,
    current: Duration,
}

impl Backoff {
    /// Creates a policy starting at `base`.
    pub fn new(base: Duration, max: Duration, exponential: bool) -> Self {
        Self {
            base,
            max: max.max(base),
            exponential,
            current: base,
        }
    }

    /// Delay for the next attempt; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        if self.exponential {
            let next = self.current.checked_mul(2).unwrap_or(self.max);
            self.current = next.min(self.max);
        }
        delay
    }

    /// Back to the base delay after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
