//! Reconnection manager — channel lifecycle supervision with backoff.
//!
//! ```text
//! disconnected ──► connecting ──► connected
//!                     ▲   │           │
//!                     │   ▼           ▼
//!                     └── error ◄─────┘
//! connected ──► disconnected   (explicit teardown, terminal)
//! ```

use std::time::Duration;

use tokio::time::Instant;

use super::backoff::Backoff;
use super::state::ConnectionState;

/// Tracks connection state, retry timing, and connection generations.
#[derive(Debug)]
pub struct ReconnectionManager {
    state: ConnectionState,
    backoff: Backoff,
    /// When the next retry is due, while in `Error`.
    retry_at: Option<Instant>,
    /// Consecutive failed attempts.
    failures: u32,
    /// Incremented per connect attempt; tags inbound events.
    generation: u64,
    /// Set by teardown; no further attempts are started.
    closed: bool,
}

impl ReconnectionManager {
    /// Creates a disconnected manager.
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff,
            retry_at: None,
            failures: 0,
            generation: 0,
            closed: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Generation of the current or last attempt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Consecutive failures since the last successful connect.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// When the scheduled retry is due.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Starts an attempt unless one is in flight, the channel is already up,
    /// or the scope was torn down. Returns the attempt's generation.
    pub fn begin_connect(&mut self) -> Option<u64> {
        if self.closed {
            return None;
        }
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => None,
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.state = ConnectionState::Connecting;
                self.retry_at = None;
                self.generation += 1;
                Some(self.generation)
            }
        }
    }

    /// Marks the attempt successful and resets the backoff.
    pub fn on_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.failures = 0;
        self.backoff.reset();
    }

    /// Records a failed attempt or a dropped channel and schedules a retry.
    ///
    /// Returns the retry delay, or `None` if there was nothing to fail.
    pub fn on_failure(&mut self, now: Instant) -> Option<Duration> {
        if self.closed
            || !matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Connected
            )
        {
            return None;
        }
        self.state = ConnectionState::Error;
        self.failures += 1;
        let delay = self.backoff.next_delay();
        self.retry_at = Some(now + delay);
        Some(delay)
    }

    /// Explicit teardown. Terminal.
    pub fn on_teardown(&mut self) {
        self.closed = true;
        self.state = ConnectionState::Disconnected;
        self.retry_at = None;
    }
}
