//! Heartbeat scheduler — periodic republish of the local record, staleness
//! pruning of silent peers, and the idle check trigger.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use pulseboard_core::types::UserId;

use super::activity::{ActivityMonitor, StatusTransition};
use super::store::PresenceStateStore;

/// What one heartbeat tick did to local state.
#[derive(Debug, Default)]
pub struct HeartbeatOutcome {
    /// Peers removed for silence.
    pub pruned: Vec<UserId>,
    /// Idle transition requested from the activity monitor.
    pub idle_transition: Option<StatusTransition>,
}

/// Fixed-interval ticker that only runs while the channel is connected.
#[derive(Debug)]
pub struct HeartbeatScheduler {
    /// Interval between ticks.
    interval: Duration,
    /// Silence after which a peer is pruned.
    peer_timeout: Duration,
    /// Live ticker; `None` while stopped.
    ticker: Option<Interval>,
}

impl HeartbeatScheduler {
    /// Creates a stopped scheduler.
    pub fn new(interval: Duration, peer_timeout: Duration) -> Self {
        Self {
            interval,
            peer_timeout,
            ticker: None,
        }
    }

    /// Starts ticking one interval from now. Restarting resets the phase.
    pub fn start(&mut self) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    /// Stops ticking and releases the timer.
    pub fn stop(&mut self) {
        self.ticker = None;
    }

    /// Waits for the next tick. Never resolves while stopped.
    pub async fn tick(&mut self) -> Instant {
        match self.ticker.as_mut() {
            Some(ticker) => ticker.tick().await,
            None => std::future::pending().await,
        }
    }

    /// Runs the per-tick maintenance against local state.
    ///
    /// The scheduler only triggers the idle check; the monitor decides
    /// whether a transition happens.
    pub fn on_tick(
        &self,
        store: &mut PresenceStateStore,
        monitor: &mut ActivityMonitor,
        wall_now: DateTime<Utc>,
        now: Instant,
    ) -> HeartbeatOutcome {
        let pruned = store.prune_stale(wall_now, self.peer_timeout);
        if !pruned.is_empty() {
            tracing::debug!(count = pruned.len(), "Pruned silent peers");
        }
        HeartbeatOutcome {
            pruned,
            idle_transition: monitor.check_idle(now),
        }
    }
}
