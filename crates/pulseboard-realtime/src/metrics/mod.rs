//! Presence engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Per-scope presence counters.
#[derive(Debug, Default)]
pub struct PresenceMetrics {
    /// Inbound events that reached the store
    pub events_applied: AtomicU64,
    /// Inbound payloads rejected at validation
    pub events_malformed: AtomicU64,
    /// Updates dropped by last-writer-wins
    pub updates_stale: AtomicU64,
    /// Events discarded because they belonged to an earlier connection
    pub events_superseded: AtomicU64,
    /// Inbound events rejected by a full queue; each burst forces a resync
    pub events_overflowed: AtomicU64,
    /// Peers removed by staleness pruning
    pub peers_pruned: AtomicU64,
    /// Connect attempts started
    pub connect_attempts: AtomicU64,
    /// Connect attempts or live channels that failed
    pub connection_failures: AtomicU64,
    /// Publish or broadcast calls the transport rejected
    pub transport_failures: AtomicU64,
}

impl PresenceMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment a counter by `n`
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_malformed: self.events_malformed.load(Ordering::Relaxed),
            updates_stale: self.updates_stale.load(Ordering::Relaxed),
            events_superseded: self.events_superseded.load(Ordering::Relaxed),
            events_overflowed: self.events_overflowed.load(Ordering::Relaxed),
            peers_pruned: self.peers_pruned.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Inbound events that reached the store
    pub events_applied: u64,
    /// Inbound payloads rejected at validation
    pub events_malformed: u64,
    /// Updates dropped by last-writer-wins
    pub updates_stale: u64,
    /// Events from an earlier connection
    pub events_superseded: u64,
    /// Events dropped on a full queue
    pub events_overflowed: u64,
    /// Peers pruned for silence
    pub peers_pruned: u64,
    /// Connect attempts started
    pub connect_attempts: u64,
    /// Connection failures
    pub connection_failures: u64,
    /// Rejected publishes/broadcasts
    pub transport_failures: u64,
}
