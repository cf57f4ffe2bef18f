//! In-memory presence channel for single-process deployments, demos, and tests.
//!
//! A [`MemoryHub`] holds one room per channel name. Each [`MemoryChannel`] is
//! one peer's handle on a room, with fault injection for exercising the
//! reconnection path.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use pulseboard_core::error::AppError;
use pulseboard_core::result::AppResult;
use pulseboard_core::traits::{
    BroadcastHandler, ChannelPort, ChannelStatus, MembershipHandler, PresenceSyncHandler,
    StatusHandler,
};
use pulseboard_core::types::{PresenceRecord, Scope, UserId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Registered callbacks of one endpoint.
#[derive(Default)]
struct Handlers {
    sync: Option<Arc<PresenceSyncHandler>>,
    join: Option<Arc<MembershipHandler>>,
    leave: Option<Arc<MembershipHandler>>,
    broadcast: HashMap<String, Arc<BroadcastHandler>>,
    status: Option<Arc<StatusHandler>>,
}

/// One peer's side of a room.
struct Endpoint {
    id: Uuid,
    user_id: UserId,
    handlers: Mutex<Handlers>,
    connected: AtomicBool,
    fail_connects: AtomicU32,
    fail_publishes: AtomicBool,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    fn deliver_sync(&self, state: HashMap<String, Value>) {
        let handler = lock(&self.handlers).sync.clone();
        if let Some(handler) = handler {
            handler(state);
        }
    }

    fn deliver_join(&self, joined: Vec<Value>) {
        let handler = lock(&self.handlers).join.clone();
        if let Some(handler) = handler {
            handler(joined);
        }
    }

    fn deliver_leave(&self, left: Vec<Value>) {
        let handler = lock(&self.handlers).leave.clone();
        if let Some(handler) = handler {
            handler(left);
        }
    }

    fn deliver_broadcast(&self, event: &str, payload: Value) {
        let handler = lock(&self.handlers).broadcast.get(event).cloned();
        if let Some(handler) = handler {
            handler(payload);
        }
    }

    fn deliver_status(&self, status: ChannelStatus) {
        let handler = lock(&self.handlers).status.clone();
        if let Some(handler) = handler {
            handler(status);
        }
    }
}

/// Members and advertised presence of one channel.
#[derive(Debug, Default)]
struct Room {
    members: Mutex<Vec<Arc<Endpoint>>>,
    /// User ID → last published record.
    presence: Mutex<HashMap<String, Value>>,
}

impl Room {
    fn members(&self) -> Vec<Arc<Endpoint>> {
        lock(&self.members).clone()
    }

    fn others(&self, id: Uuid) -> Vec<Arc<Endpoint>> {
        lock(&self.members)
            .iter()
            .filter(|m| m.id != id)
            .cloned()
            .collect()
    }

    fn state(&self) -> HashMap<String, Value> {
        lock(&self.presence).clone()
    }

    /// Removes the endpoint and its advertised record, notifying the others.
    fn remove(&self, endpoint: &Endpoint) {
        lock(&self.members).retain(|m| m.id != endpoint.id);
        let removed = lock(&self.presence).remove(endpoint.user_id.as_str());
        if let Some(record) = removed {
            for member in self.others(endpoint.id) {
                member.deliver_leave(vec![record.clone()]);
            }
        }
    }
}

/// In-process realtime hub. Cloning shares the same rooms.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    /// Channel name → room
    rooms: Arc<DashMap<String, Arc<Room>>>,
}

impl MemoryHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a handle on `scope` for `user_id`.
    ///
    /// Presence is keyed by user ID, so two handles for the same user
    /// overwrite each other's record.
    pub fn channel(&self, scope: &Scope, user_id: impl Into<UserId>) -> MemoryChannel {
        let channel = scope.channel_name();
        let room = self.rooms.entry(channel.clone()).or_default().clone();
        MemoryChannel {
            channel,
            room,
            endpoint: Arc::new(Endpoint {
                id: Uuid::new_v4(),
                user_id: user_id.into(),
                handlers: Mutex::new(Handlers::default()),
                connected: AtomicBool::new(false),
                fail_connects: AtomicU32::new(0),
                fail_publishes: AtomicBool::new(false),
            }),
        }
    }

    /// Presence currently advertised on `channel`
    pub fn presence_state(&self, channel: &str) -> HashMap<String, Value> {
        self.rooms
            .get(channel)
            .map(|room| room.state())
            .unwrap_or_default()
    }

    /// Number of connected handles on `channel`
    pub fn member_count(&self, channel: &str) -> usize {
        self.rooms
            .get(channel)
            .map(|room| lock(&room.members).len())
            .unwrap_or(0)
    }

    /// Re-send the full presence state to every member of `channel`
    pub fn resync(&self, channel: &str) {
        if let Some(room) = self.rooms.get(channel).map(|r| r.clone()) {
            let state = room.state();
            for member in room.members() {
                member.deliver_sync(state.clone());
            }
        }
    }

    /// Deliver an arbitrary broadcast to every member of `channel`
    pub fn inject_broadcast(&self, channel: &str, event: &str, payload: Value) {
        if let Some(room) = self.rooms.get(channel).map(|r| r.clone()) {
            for member in room.members() {
                member.deliver_broadcast(event, payload.clone());
            }
        }
    }
}

/// One peer's handle on a [`MemoryHub`] channel.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    channel: String,
    room: Arc<Room>,
    endpoint: Arc<Endpoint>,
}

impl MemoryChannel {
    /// Make the next `n` connect attempts fail
    pub fn fail_next_connects(&self, n: u32) {
        self.endpoint.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Make publishes and broadcasts fail until cleared
    pub fn set_fail_publishes(&self, fail: bool) {
        self.endpoint.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Drop the connection as a network failure would: peers see a leave,
    /// and this handle reports a channel error.
    pub fn sever(&self) {
        if !self.endpoint.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.room.remove(&self.endpoint);
        self.endpoint
            .deliver_status(ChannelStatus::Error("connection severed".to_string()));
    }

    /// Whether this handle is joined to its room
    pub fn is_connected(&self) -> bool {
        self.endpoint.connected.load(Ordering::SeqCst)
    }

    fn ensure_writable(&self) -> AppResult<()> {
        if !self.is_connected() {
            return Err(AppError::transport(format!(
                "Channel '{}' is not connected",
                self.channel
            )));
        }
        if self.endpoint.fail_publishes.load(Ordering::SeqCst) {
            return Err(AppError::transport("Simulated publish failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelPort for MemoryChannel {
    fn channel_name(&self) -> &str {
        &self.channel
    }

    async fn connect(&self) -> AppResult<()> {
        let pending = self.endpoint.fail_connects.load(Ordering::SeqCst);
        if pending > 0 {
            self.endpoint
                .fail_connects
                .store(pending - 1, Ordering::SeqCst);
            return Err(AppError::connection("Simulated connect failure"));
        }
        if self.endpoint.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        lock(&self.room.members).push(self.endpoint.clone());
        self.endpoint.deliver_status(ChannelStatus::Subscribed);
        self.endpoint.deliver_sync(self.room.state());
        tracing::debug!(channel = %self.channel, user_id = %self.endpoint.user_id, "Memory channel joined");
        Ok(())
    }

    async fn disconnect(&self) -> AppResult<()> {
        if self.endpoint.connected.swap(false, Ordering::SeqCst) {
            self.room.remove(&self.endpoint);
        }
        Ok(())
    }

    async fn publish_presence(&self, record: &PresenceRecord) -> AppResult<()> {
        self.ensure_writable()?;
        let value = serde_json::to_value(record)?;
        lock(&self.room.presence).insert(self.endpoint.user_id.to_string(), value.clone());
        for member in self.room.members() {
            member.deliver_join(vec![value.clone()]);
        }
        Ok(())
    }

    async fn broadcast(&self, event: &str, payload: Value) -> AppResult<()> {
        self.ensure_writable()?;
        for member in self.room.others(self.endpoint.id) {
            member.deliver_broadcast(event, payload.clone());
        }
        Ok(())
    }

    fn subscribe_presence_sync(&self, handler: PresenceSyncHandler) {
        lock(&self.endpoint.handlers).sync = Some(Arc::new(handler));
    }

    fn subscribe_join(&self, handler: MembershipHandler) {
        lock(&self.endpoint.handlers).join = Some(Arc::new(handler));
    }

    fn subscribe_leave(&self, handler: MembershipHandler) {
        lock(&self.endpoint.handlers).leave = Some(Arc::new(handler));
    }

    fn subscribe_broadcast(&self, event: &str, handler: BroadcastHandler) {
        lock(&self.endpoint.handlers)
            .broadcast
            .insert(event.to_string(), Arc::new(handler));
    }

    fn subscribe_status(&self, handler: StatusHandler) {
        lock(&self.endpoint.handlers).status = Some(Arc::new(handler));
    }

    fn unsubscribe_all(&self) {
        *lock(&self.endpoint.handlers) = Handlers::default();
    }
}
