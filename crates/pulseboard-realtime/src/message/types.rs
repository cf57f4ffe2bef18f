//! Presence broadcast payloads and inbound channel events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pulseboard_core::traits::ChannelStatus;
use pulseboard_core::types::{Activity, PresenceStatus, UserId};

/// Broadcast event name for activity/location changes.
pub const ACTIVITY_UPDATE: &str = "activity_update";
/// Broadcast event name for status changes.
pub const STATUS_CHANGE: &str = "status_change";

/// A validated presence broadcast, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum PresenceBroadcast {
    /// A peer changed what it is doing or where.
    ActivityUpdate {
        /// Peer ID.
        #[serde(rename = "userId")]
        user_id: UserId,
        /// New activity label.
        activity: Activity,
        /// New location.
        location: Option<String>,
        /// Producer timestamp.
        timestamp: DateTime<Utc>,
    },
    /// A peer's status moved through its state machine.
    StatusChange {
        /// Peer ID.
        #[serde(rename = "userId")]
        user_id: UserId,
        /// New status.
        status: PresenceStatus,
        /// Producer timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl PresenceBroadcast {
    /// Transport event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ActivityUpdate { .. } => ACTIVITY_UPDATE,
            Self::StatusChange { .. } => STATUS_CHANGE,
        }
    }

    /// Peer the broadcast is about.
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::ActivityUpdate { user_id, .. } | Self::StatusChange { user_id, .. } => user_id,
        }
    }

    /// Producer timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ActivityUpdate { timestamp, .. } | Self::StatusChange { timestamp, .. } => {
                *timestamp
            }
        }
    }

    /// Flat JSON payload as sent over the transport (no event tag).
    pub fn payload(&self) -> Value {
        match self {
            Self::ActivityUpdate {
                user_id,
                activity,
                location,
                timestamp,
            } => serde_json::json!({
                "userId": user_id,
                "activity": activity,
                "location": location,
                "timestamp": timestamp,
            }),
            Self::StatusChange {
                user_id,
                status,
                timestamp,
            } => serde_json::json!({
                "userId": user_id,
                "status": status,
                "timestamp": timestamp,
            }),
        }
    }
}

/// One item on a scope's inbound queue, as delivered by transport callbacks.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Full presence state.
    Sync(HashMap<String, Value>),
    /// Peers joined or re-advertised.
    Join(Vec<Value>),
    /// Peers left.
    Leave(Vec<Value>),
    /// A named broadcast.
    Broadcast {
        /// Event name.
        event: String,
        /// Raw payload.
        payload: Value,
    },
    /// Channel lifecycle change.
    Status(ChannelStatus),
    /// The bounded queue rejected at least one event; local state can no
    /// longer be trusted until the next full sync.
    Overflowed,
}

impl ChannelEvent {
    /// Whether the event belongs on the lossless control queue.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Status(_) | Self::Overflowed)
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::Broadcast { .. } => "broadcast",
            Self::Status(_) => "status",
            Self::Overflowed => "overflowed",
        }
    }
}

/// An inbound event stamped with the connection attempt that produced it.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    /// Connection generation at registration time.
    pub generation: u64,
    /// The event.
    pub event: ChannelEvent,
}
