//! Channel connection state as exposed to consumers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a scope's channel.
///
/// Consumers should read `Error` and `Disconnected` as "presence unknown",
/// not as "everyone offline".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected and not trying.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Subscribed and publishing.
    Connected,
    /// The last attempt or the live channel failed; a retry is scheduled.
    Error,
}

impl ConnectionState {
    /// Converts to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
