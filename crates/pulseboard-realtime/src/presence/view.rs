//! Read-only presence view handed to consumers.

use serde::{Deserialize, Serialize};

use pulseboard_core::types::{PresenceRecord, PresenceStatus, UserId};

/// Remote peer counts per status.
///
/// `offline` is always zero for remote peers: offline peers are absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Online peers.
    pub online: usize,
    /// Away peers.
    pub away: usize,
    /// Busy peers.
    pub busy: usize,
    /// Offline peers.
    pub offline: usize,
}

impl StatusCounts {
    fn record(&mut self, status: PresenceStatus) {
        match status {
            PresenceStatus::Online => self.online += 1,
            PresenceStatus::Away => self.away += 1,
            PresenceStatus::Busy => self.busy += 1,
            PresenceStatus::Offline => self.offline += 1,
        }
    }
}

/// Snapshot of the remote peers in one scope, ordered by user id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceView {
    /// Remote peers, never including the local user.
    pub peers: Vec<PresenceRecord>,
    /// Number of peers.
    pub total_count: usize,
    /// Peer counts by status.
    pub counts_by_status: StatusCounts,
}

impl PresenceView {
    /// Builds a view from an unordered set of peer records.
    pub fn from_peers<'a>(records: impl IntoIterator<Item = &'a PresenceRecord>) -> Self {
        let mut peers: Vec<PresenceRecord> = records.into_iter().cloned().collect();
        peers.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let mut counts = StatusCounts::default();
        for peer in &peers {
            counts.record(peer.status);
        }

        Self {
            total_count: peers.len(),
            peers,
            counts_by_status: counts,
        }
    }

    /// Looks up a peer.
    pub fn get(&self, user_id: &UserId) -> Option<&PresenceRecord> {
        self.peers
            .binary_search_by(|p| p.user_id.cmp(user_id))
            .ok()
            .map(|idx| &self.peers[idx])
    }

    /// Whether there are no remote peers.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
