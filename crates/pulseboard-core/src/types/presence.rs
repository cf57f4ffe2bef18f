//! Presence status, activity labels, and the advertised presence record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::UserId;
use crate::error::AppError;

/// User presence status.
///
/// `Offline` is never advertised by a connected peer; a missing record means
/// the peer is offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Connected and recently interacted.
    Online,
    /// Connected but idle, hidden, or unfocused.
    Away,
    /// Manually marked as busy.
    Busy,
    /// Not connected.
    Offline,
}

impl PresenceStatus {
    /// Converts to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }
}

impl FromStr for PresenceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            other => Err(AppError::validation(format!(
                "Unknown presence status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a peer is currently doing. The set is open: labels this build does
/// not know are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Activity {
    /// Navigating between pages.
    Browsing,
    /// Editing a resource.
    Editing,
    /// Reading a resource.
    Viewing,
    /// Creating a new resource.
    Creating,
    /// Writing a comment.
    Commenting,
    /// No recent interaction.
    Idle,
    /// A label produced by a newer or foreign client.
    Other(String),
}

impl Activity {
    /// Converts to the wire label.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Browsing => "browsing",
            Self::Editing => "editing",
            Self::Viewing => "viewing",
            Self::Creating => "creating",
            Self::Commenting => "commenting",
            Self::Idle => "idle",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for Activity {
    fn from(label: String) -> Self {
        match label.as_str() {
            "browsing" => Self::Browsing,
            "editing" => Self::Editing,
            "viewing" => Self::Viewing,
            "creating" => Self::Creating,
            "commenting" => Self::Commenting,
            "idle" => Self::Idle,
            _ => Self::Other(label),
        }
    }
}

impl From<&str> for Activity {
    fn from(label: &str) -> Self {
        Self::from(label.to_string())
    }
}

impl From<Activity> for String {
    fn from(activity: Activity) -> Self {
        match activity {
            Activity::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One peer's advertised state within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    /// Identity key.
    pub user_id: UserId,
    /// Display name (opaque).
    pub display_name: String,
    /// Role label (opaque).
    pub role: String,
    /// Current status.
    pub status: PresenceStatus,
    /// Current activity label.
    pub activity: Activity,
    /// Where the peer is, usually a route path.
    pub location: Option<String>,
    /// When the producer last updated this record (producer's clock).
    pub last_active: DateTime<Utc>,
    /// Channel name the record belongs to.
    pub scope: String,
}

impl PresenceRecord {
    /// Creates a freshly connected record: online, browsing, stamped now.
    pub fn connected(
        user_id: UserId,
        display_name: impl Into<String>,
        role: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            role: role.into(),
            status: PresenceStatus::Online,
            activity: Activity::Browsing,
            location: None,
            last_active: Utc::now(),
            scope: scope.into(),
        }
    }

    /// Whether `other` describes the same peer at a moment not earlier than this one.
    pub fn is_superseded_by(&self, other: &PresenceRecord) -> bool {
        other.user_id == self.user_id && other.last_active >= self.last_active
    }
}
