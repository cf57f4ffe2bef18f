//! Ingestion-boundary validation of transport payloads.
//!
//! Everything the transport hands over is untyped JSON from other peers.
//! These functions turn it into typed values or reject it; a rejected
//! payload is dropped by the caller and never reaches the store.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use pulseboard_core::error::AppError;
use pulseboard_core::types::{Activity, PresenceRecord, PresenceStatus, UserId};

use super::types::{ACTIVITY_UPDATE, PresenceBroadcast, STATUS_CHANGE};

/// Timestamps arrive either as RFC 3339 strings or epoch milliseconds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    fn resolve(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(ms) => Utc.timestamp_millis_opt(ms).single(),
            Self::Text(text) => DateTime::parse_from_rfc3339(&text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    user_id: Option<String>,
    display_name: Option<String>,
    role: Option<String>,
    status: Option<String>,
    activity: Option<String>,
    location: Option<String>,
    last_active: Option<WireTimestamp>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBroadcast {
    user_id: Option<String>,
    activity: Option<String>,
    location: Option<String>,
    status: Option<String>,
    timestamp: Option<WireTimestamp>,
}

fn require_user_id(raw: Option<String>) -> Result<UserId, AppError> {
    let id = UserId::from(raw.ok_or_else(|| AppError::validation("Missing userId"))?);
    if id.is_blank() {
        return Err(AppError::validation("Blank userId"));
    }
    Ok(id)
}

fn require_timestamp(raw: Option<WireTimestamp>, field: &str) -> Result<DateTime<Utc>, AppError> {
    raw.ok_or_else(|| AppError::validation(format!("Missing {field}")))?
        .resolve()
        .ok_or_else(|| AppError::validation(format!("Unparseable {field}")))
}

/// Validates one presence record from a sync snapshot or join batch.
///
/// Records advertising a different scope than `scope` are rejected.
/// A missing status is read as online: a peer advertising presence is connected.
pub fn parse_record(value: &Value, scope: &str) -> Result<PresenceRecord, AppError> {
    let wire: WireRecord = WireRecord::deserialize(value)
        .map_err(|e| AppError::validation(format!("Malformed presence record: {e}")))?;

    let user_id = require_user_id(wire.user_id)?;
    let last_active = require_timestamp(wire.last_active, "lastActive")?;

    if let Some(record_scope) = &wire.scope {
        if record_scope != scope {
            return Err(AppError::validation(format!(
                "Record for scope '{record_scope}' delivered on '{scope}'"
            )));
        }
    }

    let status = match wire.status {
        Some(raw) => raw.parse::<PresenceStatus>()?,
        None => PresenceStatus::Online,
    };

    Ok(PresenceRecord {
        user_id,
        display_name: wire.display_name.unwrap_or_default(),
        role: wire.role.unwrap_or_default(),
        status,
        activity: wire.activity.map(Activity::from).unwrap_or(Activity::Browsing),
        location: wire.location,
        last_active,
        scope: scope.to_string(),
    })
}

/// Extracts the peer id from a leave entry. Only the id is required.
pub fn parse_leave(value: &Value) -> Result<UserId, AppError> {
    let user_id = value
        .get("userId")
        .and_then(Value::as_str)
        .map(str::to_string);
    require_user_id(user_id)
}

/// Validates a broadcast payload for one of the two known event names.
pub fn parse_broadcast(event: &str, payload: &Value) -> Result<PresenceBroadcast, AppError> {
    let wire: WireBroadcast = WireBroadcast::deserialize(payload)
        .map_err(|e| AppError::validation(format!("Malformed {event} payload: {e}")))?;

    let user_id = require_user_id(wire.user_id)?;
    let timestamp = require_timestamp(wire.timestamp, "timestamp")?;

    match event {
        ACTIVITY_UPDATE => {
            let activity = wire
                .activity
                .ok_or_else(|| AppError::validation("activity_update without activity"))?;
            Ok(PresenceBroadcast::ActivityUpdate {
                user_id,
                activity: Activity::from(activity),
                location: wire.location,
                timestamp,
            })
        }
        STATUS_CHANGE => {
            let status = wire
                .status
                .ok_or_else(|| AppError::validation("status_change without status"))?
                .parse::<PresenceStatus>()?;
            Ok(PresenceBroadcast::StatusChange {
                user_id,
                status,
                timestamp,
            })
        }
        other => Err(AppError::validation(format!(
            "Unknown broadcast event '{other}'"
        ))),
    }
}
