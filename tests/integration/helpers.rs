//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use pulseboard_core::config::PresenceConfig;
use pulseboard_core::types::{PresenceRecord, Scope};
use pulseboard_realtime::{
    ConnectionState, LocalIdentity, MemoryChannel, MemoryHub, MetricsSnapshot, PresenceTracker,
    PresenceView,
};

/// Upper bound for any single wait.
pub const WAIT: Duration = Duration::from_secs(10);

/// Production defaults with a short reconnect delay
pub fn test_config() -> PresenceConfig {
    PresenceConfig {
        reconnect_delay_ms: 100,
        reconnect_max_delay_ms: 1_000,
        ..PresenceConfig::default()
    }
}

/// A peer joined to a hub scope
pub struct TestPeer {
    pub tracker: PresenceTracker,
    pub channel: Arc<MemoryChannel>,
}

impl TestPeer {
    /// Start a tracker without waiting for it to connect
    pub fn start(hub: &MemoryHub, scope: &Scope, user: &str) -> Self {
        let channel = Arc::new(hub.channel(scope, user));
        Self::start_on(channel, scope, user)
    }

    /// Start a tracker on a prepared channel
    pub fn start_on(channel: Arc<MemoryChannel>, scope: &Scope, user: &str) -> Self {
        Self::start_with(channel, scope, user, test_config())
    }

    /// Start a tracker on a prepared channel with its own configuration
    pub fn start_with(
        channel: Arc<MemoryChannel>,
        scope: &Scope,
        user: &str,
        config: PresenceConfig,
    ) -> Self {
        let identity = LocalIdentity::new(user, format!("User {user}"), "member");
        let tracker = PresenceTracker::start(identity, scope.clone(), channel.clone(), config)
            .expect("Failed to start tracker");
        Self { tracker, channel }
    }

    /// Start a tracker and wait until it is connected
    pub async fn join(hub: &MemoryHub, scope: &Scope, user: &str) -> Self {
        let peer = Self::start(hub, scope, user);
        wait_for_state(&peer.tracker, ConnectionState::Connected).await;
        peer
    }
}

/// Wait until the tracker's view satisfies `pred`
pub async fn wait_for_view(
    tracker: &PresenceTracker,
    pred: impl FnMut(&PresenceView) -> bool,
) -> PresenceView {
    let mut rx = tracker.subscribe();
    let view = timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("Timed out waiting for presence view")
        .expect("Presence worker stopped");
    (*view).clone()
}

/// Wait until the tracker's local record satisfies `pred`
pub async fn wait_for_local(
    tracker: &PresenceTracker,
    pred: impl FnMut(&PresenceRecord) -> bool,
) -> PresenceRecord {
    let mut rx = tracker.local_changes();
    let record = timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("Timed out waiting for local record")
        .expect("Presence worker stopped");
    (*record).clone()
}

/// Wait until the tracker reaches `state`
pub async fn wait_for_state(tracker: &PresenceTracker, state: ConnectionState) {
    let mut rx = tracker.connection_changes();
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .expect("Timed out waiting for connection state")
        .expect("Presence worker stopped");
}

/// Poll the tracker's metrics until `pred` holds
pub async fn wait_for_metrics(
    tracker: &PresenceTracker,
    mut pred: impl FnMut(&MetricsSnapshot) -> bool,
) -> MetricsSnapshot {
    timeout(WAIT, async {
        loop {
            let snapshot = tracker.metrics();
            if pred(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timed out waiting for metrics")
}
