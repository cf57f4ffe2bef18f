//! Presence state store — reconciles sync snapshots and incremental events
//! into one canonical map of remote peers.
//!
//! Events arrive unordered and possibly duplicated. Per peer, `last_active`
//! decides: an update older than what is stored is dropped. Membership is
//! decided by sync (authoritative), join, leave, and staleness pruning.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use pulseboard_core::types::{PresenceRecord, PresenceStatus, UserId};

use super::view::PresenceView;
use crate::message::types::PresenceBroadcast;

/// Result of applying one broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The peer's record changed.
    Applied,
    /// The peer went offline and was removed.
    Removed,
    /// Older than the stored record; dropped.
    Stale,
    /// No record for the peer yet; dropped until it joins or syncs.
    UnknownPeer,
    /// About the local user; ignored.
    SelfIgnored,
}

/// Canonical map of remote peers for one scope.
#[derive(Debug)]
pub struct PresenceStateStore {
    /// The local user, excluded from every view.
    local_user: UserId,
    /// User ID → current record.
    peers: HashMap<UserId, PresenceRecord>,
}

impl PresenceStateStore {
    /// Creates an empty store for `local_user`.
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            peers: HashMap::new(),
        }
    }

    /// Replaces the remote set with `snapshot`.
    ///
    /// Membership follows the snapshot exactly. For a peer already known with
    /// a newer record than the snapshot carries, the newer record is kept.
    /// Returns whether the store changed.
    pub fn apply_sync(&mut self, snapshot: HashMap<UserId, PresenceRecord>) -> bool {
        let mut next: HashMap<UserId, PresenceRecord> = HashMap::with_capacity(snapshot.len());

        for record in snapshot.into_values() {
            if !self.admits(&record) {
                continue;
            }
            let current = next
                .get(&record.user_id)
                .or_else(|| self.peers.get(&record.user_id));
            let winner = match current {
                Some(existing) if !existing.is_superseded_by(&record) => existing.clone(),
                _ => record,
            };
            next.insert(winner.user_id.clone(), winner);
        }

        if next == self.peers {
            return false;
        }
        self.peers = next;
        true
    }

    /// Upserts joined peers. Returns whether the store changed.
    pub fn apply_join(&mut self, records: Vec<PresenceRecord>) -> bool {
        let mut changed = false;
        for record in records {
            if !self.admits(&record) {
                continue;
            }
            match self.peers.get(&record.user_id) {
                Some(existing) if !existing.is_superseded_by(&record) => {
                    tracing::debug!(user_id = %record.user_id, "Dropping stale join");
                }
                Some(existing) if *existing == record => {}
                _ => {
                    self.peers.insert(record.user_id.clone(), record);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Removes departed peers. Unknown ids are ignored. Returns whether the store changed.
    pub fn apply_leave(&mut self, user_ids: &[UserId]) -> bool {
        let mut changed = false;
        for user_id in user_ids {
            changed |= self.peers.remove(user_id).is_some();
        }
        changed
    }

    /// Applies an activity or status broadcast under last-writer-wins.
    pub fn apply_broadcast(&mut self, broadcast: &PresenceBroadcast) -> BroadcastOutcome {
        let user_id = broadcast.user_id();
        if *user_id == self.local_user {
            return BroadcastOutcome::SelfIgnored;
        }

        let timestamp = broadcast.timestamp();
        let Some(peer) = self.peers.get_mut(user_id) else {
            return BroadcastOutcome::UnknownPeer;
        };
        // Equal timestamps are applied.
        if timestamp < peer.last_active {
            return BroadcastOutcome::Stale;
        }

        match broadcast {
            PresenceBroadcast::ActivityUpdate {
                activity, location, ..
            } => {
                peer.activity = activity.clone();
                peer.location = location.clone();
            }
            PresenceBroadcast::StatusChange {
                status: PresenceStatus::Offline,
                ..
            } => {
                self.peers.remove(user_id);
                return BroadcastOutcome::Removed;
            }
            PresenceBroadcast::StatusChange { status, .. } => {
                peer.status = *status;
            }
        }
        peer.last_active = timestamp;
        BroadcastOutcome::Applied
    }

    /// Removes every peer whose last update is older than `timeout` at `now`.
    pub fn prune_stale(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<UserId> {
        let timeout = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
        let Some(cutoff) = now.checked_sub_signed(timeout) else {
            return Vec::new();
        };

        let stale: Vec<UserId> = self
            .peers
            .values()
            .filter(|p| p.last_active < cutoff)
            .map(|p| p.user_id.clone())
            .collect();

        for user_id in &stale {
            self.peers.remove(user_id);
        }
        stale
    }

    /// Forgets every peer. Returns whether anything was removed.
    pub fn clear(&mut self) -> bool {
        let had_peers = !self.peers.is_empty();
        self.peers.clear();
        had_peers
    }

    /// Current record for a peer.
    pub fn get(&self, user_id: &UserId) -> Option<&PresenceRecord> {
        self.peers.get(user_id)
    }

    /// Number of remote peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether there are no remote peers.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Derives the consumer view.
    pub fn view(&self) -> PresenceView {
        PresenceView::from_peers(self.peers.values())
    }

    fn admits(&self, record: &PresenceRecord) -> bool {
        record.user_id != self.local_user && record.status != PresenceStatus::Offline
    }
}
