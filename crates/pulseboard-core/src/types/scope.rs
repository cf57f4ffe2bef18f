//! Presence scope names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Longest accepted channel name.
const MAX_CHANNEL_NAME: usize = 256;

/// A named partition of presence state. Peers in different scopes never see
/// each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Scope {
    /// Application-wide presence.
    Global,
    /// Presence on a single project's pages.
    Project(String),
    /// Any other resource-specific channel.
    Named(String),
}

impl Scope {
    /// Parses a channel name into a typed scope.
    pub fn parse(channel: &str) -> Result<Self, AppError> {
        validate_channel_name(channel)?;
        Ok(match channel {
            "global" => Scope::Global,
            other => match other.strip_prefix("project_") {
                Some(id) if !id.is_empty() => Scope::Project(id.to_string()),
                _ => Scope::Named(other.to_string()),
            },
        })
    }

    /// Converts back to the transport channel name.
    pub fn channel_name(&self) -> String {
        match self {
            Scope::Global => "global".to_string(),
            Scope::Project(id) => format!("project_{id}"),
            Scope::Named(name) => name.clone(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel_name())
    }
}

/// Validates channel name format.
pub fn validate_channel_name(channel: &str) -> Result<(), AppError> {
    if channel.is_empty() || channel.len() > MAX_CHANNEL_NAME {
        return Err(AppError::validation("Invalid channel name length"));
    }

    if !channel
        .chars()
        .all(|c| c.is_alphanumeric() || c == ':' || c == '-' || c == '_')
    {
        return Err(AppError::validation(
            "Channel name contains invalid characters",
        ));
    }

    Ok(())
}
