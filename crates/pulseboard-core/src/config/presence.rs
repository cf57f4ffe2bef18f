//! Presence engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Presence tracker configuration, shared by every scope instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Interval between heartbeat republishes, in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Local idle time after which an online user becomes away, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// A remote peer silent for this many heartbeat intervals is pruned.
    #[serde(default = "default_peer_timeout_multiplier")]
    pub peer_timeout_multiplier: u32,
    /// Base reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Upper bound for the reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_ms: u64,
    /// Double the reconnect delay after each consecutive failure.
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
    /// Capacity of the per-scope inbound event queue.
    #[serde(default = "default_event_buffer")]
    pub event_buffer_size: usize,
    /// Time allowed for the best-effort offline broadcast on teardown, in milliseconds.
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout_ms: u64,
}

impl PresenceConfig {
    /// Heartbeat tick interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Idle threshold for the online → away transition.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    /// Silence after which a remote peer is considered gone.
    pub fn peer_timeout(&self) -> Duration {
        self.heartbeat_interval() * self.peer_timeout_multiplier
    }

    /// Base reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Maximum reconnect delay.
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    /// Teardown broadcast timeout.
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    /// Rejects settings that would stall or spin the engine.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.heartbeat_interval_seconds == 0 {
            return Err(AppError::configuration(
                "presence.heartbeat_interval_seconds must be greater than zero",
            ));
        }
        if self.idle_timeout_seconds == 0 {
            return Err(AppError::configuration(
                "presence.idle_timeout_seconds must be greater than zero",
            ));
        }
        if self.peer_timeout_multiplier == 0 {
            return Err(AppError::configuration(
                "presence.peer_timeout_multiplier must be greater than zero",
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(AppError::configuration(
                "presence.event_buffer_size must be greater than zero",
            ));
        }
        if self.reconnect_max_delay_ms < self.reconnect_delay_ms {
            return Err(AppError::configuration(
                "presence.reconnect_max_delay_ms must not be below reconnect_delay_ms",
            ));
        }
        Ok(())
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
            idle_timeout_seconds: default_idle_timeout(),
            peer_timeout_multiplier: default_peer_timeout_multiplier(),
            reconnect_delay_ms: default_reconnect_delay(),
            reconnect_max_delay_ms: default_reconnect_max_delay(),
            exponential_backoff: true,
            event_buffer_size: default_event_buffer(),
            teardown_timeout_ms: default_teardown_timeout(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_peer_timeout_multiplier() -> u32 {
    3
}

fn default_reconnect_delay() -> u64 {
    2000
}

fn default_reconnect_max_delay() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_event_buffer() -> usize {
    256
}

fn default_teardown_timeout() -> u64 {
    1000
}
