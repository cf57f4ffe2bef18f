//! Pub/sub channel trait for pluggable realtime transports.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::result::AppResult;
use crate::types::presence::PresenceRecord;

/// Receives the transport's authoritative full presence state, keyed by peer.
pub type PresenceSyncHandler = Box<dyn Fn(HashMap<String, Value>) + Send + Sync>;

/// Receives incremental join or leave batches.
pub type MembershipHandler = Box<dyn Fn(Vec<Value>) + Send + Sync>;

/// Receives the payload of one named broadcast event.
pub type BroadcastHandler = Box<dyn Fn(Value) + Send + Sync>;

/// Receives channel lifecycle notifications.
pub type StatusHandler = Box<dyn Fn(ChannelStatus) + Send + Sync>;

/// Lifecycle notifications raised by the transport after `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The subscription is live.
    Subscribed,
    /// The transport closed the channel.
    Closed,
    /// The channel failed and must be reconnected.
    Error(String),
}

/// A handle to one scope's channel on a hosted realtime service.
///
/// Payloads cross a network boundary, so everything delivered to handlers is
/// untyped JSON; the consumer validates it. Handlers must not block: they are
/// called on the transport's delivery path.
#[async_trait]
pub trait ChannelPort: Send + Sync + std::fmt::Debug + 'static {
    /// Channel name this handle is bound to.
    fn channel_name(&self) -> &str;

    /// Join the channel. Handlers registered beforehand start receiving events.
    async fn connect(&self) -> AppResult<()>;

    /// Leave the channel and release the handle. Safe to call when not connected.
    async fn disconnect(&self) -> AppResult<()>;

    /// Advertise this peer's full record, replacing any earlier one.
    async fn publish_presence(&self, record: &PresenceRecord) -> AppResult<()>;

    /// Send a named event to every other subscriber of the channel.
    async fn broadcast(&self, event: &str, payload: Value) -> AppResult<()>;

    /// Register the full-state callback, fired on (re)connect and periodically.
    fn subscribe_presence_sync(&self, handler: PresenceSyncHandler);

    /// Register the join callback.
    fn subscribe_join(&self, handler: MembershipHandler);

    /// Register the leave callback.
    fn subscribe_leave(&self, handler: MembershipHandler);

    /// Register a callback for one broadcast event name.
    fn subscribe_broadcast(&self, event: &str, handler: BroadcastHandler);

    /// Register the lifecycle callback.
    fn subscribe_status(&self, handler: StatusHandler);

    /// Drop every registered handler.
    fn unsubscribe_all(&self);
}
