//! Scope worker — the single task that owns one scope's presence state.
//!
//! Transport callbacks only enqueue; the worker drains the queue, applies
//! commands, runs the heartbeat, and supervises the channel lifecycle.
//! Outbound publishes and broadcasts leave through one FIFO sender task, so
//! the transport sees them in the order the worker produced them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use pulseboard_core::config::PresenceConfig;
use pulseboard_core::traits::{ChannelPort, ChannelStatus};
use pulseboard_core::types::{PresenceRecord, UserId};

use super::activity::{ActivityMonitor, StatusTransition};
use super::heartbeat::HeartbeatScheduler;
use super::store::{BroadcastOutcome, PresenceStateStore};
use super::tracker::Command;
use super::view::PresenceView;
use crate::connection::{Backoff, ConnectionState, ReconnectionManager};
use crate::message::types::{ACTIVITY_UPDATE, STATUS_CHANGE};
use crate::message::validator;
use crate::message::{ChannelEvent, PresenceBroadcast, QueuedEvent};
use crate::metrics::PresenceMetrics;

/// Channels linking the worker to its tracker.
pub(super) struct WorkerLinks {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub view: watch::Sender<PresenceView>,
    pub local: watch::Sender<PresenceRecord>,
    pub state: watch::Sender<ConnectionState>,
    pub metrics: Arc<PresenceMetrics>,
    pub cancel: CancellationToken,
}

/// Pushes transport callbacks onto the worker queues, tagged with the
/// connection generation they were registered under.
///
/// Membership and broadcast events share a bounded queue. Lifecycle events
/// and the overflow marker go on an unbounded control queue and are never
/// dropped.
struct EventSink {
    events: mpsc::Sender<QueuedEvent>,
    control: mpsc::UnboundedSender<QueuedEvent>,
    generation: u64,
    /// Set once this generation has lost an event.
    overflowed: AtomicBool,
    scope: String,
    metrics: Arc<PresenceMetrics>,
}

impl EventSink {
    fn push(&self, event: ChannelEvent) {
        let queued = QueuedEvent {
            generation: self.generation,
            event,
        };
        if queued.event.is_control() {
            let _ = self.control.send(queued);
            return;
        }
        match self.events.try_send(queued) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(queued)) => {
                PresenceMetrics::incr(&self.metrics.events_overflowed);
                if self.overflowed.swap(true, Ordering::Relaxed) {
                    return;
                }
                warn!(
                    scope = %self.scope,
                    kind = queued.event.kind(),
                    "Presence event queue full, forcing resync"
                );
                let _ = self.control.send(QueuedEvent {
                    generation: self.generation,
                    event: ChannelEvent::Overflowed,
                });
            }
        }
    }
}

/// One call for the outbound sender task.
#[derive(Debug)]
enum Outbound {
    Publish(PresenceRecord),
    Broadcast(PresenceBroadcast),
}

/// Drains `queue` in order until every sender is gone.
async fn send_outbound(
    port: Arc<dyn ChannelPort>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    scope: String,
    metrics: Arc<PresenceMetrics>,
) {
    while let Some(outbound) = queue.recv().await {
        match outbound {
            Outbound::Publish(record) => {
                if let Err(e) = port.publish_presence(&record).await {
                    PresenceMetrics::incr(&metrics.transport_failures);
                    warn!(scope = %scope, error = %e, "Presence publish failed");
                }
            }
            Outbound::Broadcast(broadcast) => {
                if let Err(e) = port
                    .broadcast(broadcast.event_name(), broadcast.payload())
                    .await
                {
                    PresenceMetrics::incr(&metrics.transport_failures);
                    warn!(scope = %scope, event = broadcast.event_name(), error = %e, "Presence broadcast failed");
                }
            }
        }
    }
}

pub(super) struct ScopeWorker {
    scope: String,
    port: Arc<dyn ChannelPort>,
    config: PresenceConfig,
    store: PresenceStateStore,
    monitor: ActivityMonitor,
    heartbeat: HeartbeatScheduler,
    reconnect: ReconnectionManager,
    local: PresenceRecord,
    events_tx: mpsc::Sender<QueuedEvent>,
    events_rx: mpsc::Receiver<QueuedEvent>,
    control_tx: mpsc::UnboundedSender<QueuedEvent>,
    control_rx: mpsc::UnboundedReceiver<QueuedEvent>,
    /// Feeds the outbound sender task; `None` once teardown has closed it.
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    /// The outbound sender task.
    tasks: TaskTracker,
    links: WorkerLinks,
    torn_down: bool,
}

impl ScopeWorker {
    /// Builds the worker and spawns its outbound sender task.
    ///
    /// Must be called from within a Tokio runtime.
    pub(super) fn new(
        local: PresenceRecord,
        port: Arc<dyn ChannelPort>,
        config: PresenceConfig,
        links: WorkerLinks,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer_size);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let tasks = TaskTracker::new();
        tasks.spawn(send_outbound(
            port.clone(),
            outbound_rx,
            local.scope.clone(),
            links.metrics.clone(),
        ));
        let backoff = Backoff::new(
            config.reconnect_delay(),
            config.reconnect_max_delay(),
            config.exponential_backoff,
        );
        Self {
            scope: local.scope.clone(),
            store: PresenceStateStore::new(local.user_id.clone()),
            monitor: ActivityMonitor::new(config.idle_timeout(), Instant::now()),
            heartbeat: HeartbeatScheduler::new(config.heartbeat_interval(), config.peer_timeout()),
            reconnect: ReconnectionManager::new(backoff),
            port,
            config,
            local,
            events_tx,
            events_rx,
            control_tx,
            control_rx,
            outbound: Some(outbound_tx),
            tasks,
            links,
            torn_down: false,
        }
    }

    /// Connects, then serves until shutdown or cancellation.
    pub(super) async fn run(mut self) {
        info!(scope = %self.scope, user_id = %self.local.user_id, "Presence scope started");
        self.connect().await;

        loop {
            let idle_deadline = self.monitor.idle_deadline();
            let retry_deadline = self.reconnect.retry_deadline();

            tokio::select! {
                biased;

                _ = self.links.cancel.cancelled() => {
                    self.teardown().await;
                    break;
                }

                command = self.links.commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => {
                        self.teardown().await;
                        let _ = ack.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.teardown().await;
                        break;
                    }
                },

                Some(queued) = self.control_rx.recv() => self.handle_event(queued),

                Some(queued) = self.events_rx.recv() => self.handle_event(queued),

                _ = self.heartbeat.tick() => self.on_heartbeat(),

                _ = sleep_until(idle_deadline) => {
                    if let Some(transition) = self.monitor.check_idle(Instant::now()) {
                        self.apply_transition(transition);
                    }
                }

                _ = sleep_until(retry_deadline) => self.connect().await,
            }
        }

        debug!(scope = %self.scope, "Presence worker exited");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetStatus(status) => {
                match self.monitor.request_status(status, Instant::now()) {
                    Ok(Some(transition)) => self.apply_transition(transition),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(scope = %self.scope, status = %status, error = %e, "Status change rejected")
                    }
                }
            }
            Command::SetActivity { activity, location } => {
                if !self.monitor.set_activity(activity, location) {
                    return;
                }
                let now = Utc::now();
                self.refresh_local(now);
                self.publish_local();
                self.send_broadcast(PresenceBroadcast::ActivityUpdate {
                    user_id: self.local.user_id.clone(),
                    activity: self.local.activity.clone(),
                    location: self.local.location.clone(),
                    timestamp: now,
                });
            }
            Command::Signal(signal) => {
                if let Some(transition) = self.monitor.on_signal(signal, Instant::now()) {
                    self.apply_transition(transition);
                }
            }
            Command::Reconnect => self.connect().await,
            // Handled by the run loop.
            Command::Shutdown(_) => {}
        }
    }

    // ── Channel lifecycle ────────────────────────────────────────────

    async fn connect(&mut self) {
        let Some(generation) = self.reconnect.begin_connect() else {
            debug!(scope = %self.scope, state = %self.reconnect.state(), "Connect skipped");
            return;
        };
        PresenceMetrics::incr(&self.links.metrics.connect_attempts);
        self.publish_state();

        self.port.unsubscribe_all();
        self.register_handlers(generation);

        let result = tokio::select! {
            result = self.port.connect() => result,
            _ = self.links.cancel.cancelled() => return,
        };

        match result {
            Ok(()) => {
                self.reconnect.on_connected();
                if let Some(transition) = self.monitor.on_connected(Instant::now()) {
                    debug!(scope = %self.scope, to = %transition.to, "Local user online");
                }
                self.refresh_local(Utc::now());
                self.publish_local();
                self.heartbeat.start();
                self.publish_state();
                info!(scope = %self.scope, generation, "Presence channel connected");
            }
            Err(e) => self.fail(&e.to_string()),
        }
    }

    fn register_handlers(&self, generation: u64) {
        let sink = Arc::new(EventSink {
            events: self.events_tx.clone(),
            control: self.control_tx.clone(),
            generation,
            overflowed: AtomicBool::new(false),
            scope: self.scope.clone(),
            metrics: self.links.metrics.clone(),
        });

        let s = sink.clone();
        self.port
            .subscribe_presence_sync(Box::new(move |state| s.push(ChannelEvent::Sync(state))));
        let s = sink.clone();
        self.port
            .subscribe_join(Box::new(move |joined| s.push(ChannelEvent::Join(joined))));
        let s = sink.clone();
        self.port
            .subscribe_leave(Box::new(move |left| s.push(ChannelEvent::Leave(left))));
        for event in [ACTIVITY_UPDATE, STATUS_CHANGE] {
            let s = sink.clone();
            self.port.subscribe_broadcast(
                event,
                Box::new(move |payload| {
                    s.push(ChannelEvent::Broadcast {
                        event: event.to_string(),
                        payload,
                    })
                }),
            );
        }
        self.port
            .subscribe_status(Box::new(move |status| sink.push(ChannelEvent::Status(status))));
    }

    /// Failure path for both failed attempts and live channel errors.
    fn fail(&mut self, reason: &str) {
        self.heartbeat.stop();
        self.port.unsubscribe_all();
        if self.store.clear() {
            self.publish_view();
        }
        PresenceMetrics::incr(&self.links.metrics.connection_failures);
        if let Some(delay) = self.reconnect.on_failure(Instant::now()) {
            warn!(
                scope = %self.scope,
                reason,
                attempt = self.reconnect.consecutive_failures(),
                retry_in_ms = delay.as_millis() as u64,
                "Presence channel failed, reconnect scheduled"
            );
        }
        self.publish_state();
    }

    /// Stops the heartbeat, unsubscribes, announces offline, then releases
    /// the channel. Runs at most once.
    async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let was_connected = self.reconnect.state() == ConnectionState::Connected;
        self.heartbeat.stop();
        self.port.unsubscribe_all();
        self.reconnect.on_teardown();

        if self.monitor.teardown().is_some() {
            let now = Utc::now();
            self.refresh_local(now);
            if was_connected {
                self.enqueue(Outbound::Broadcast(PresenceBroadcast::StatusChange {
                    user_id: self.local.user_id.clone(),
                    status: self.local.status,
                    timestamp: now,
                }));
            }
        }

        // Closing the queue lets the sender finish what is already queued,
        // the offline broadcast last.
        self.outbound = None;
        self.tasks.close();
        let timeout = self.config.teardown_timeout();
        if time::timeout(timeout, self.tasks.wait()).await.is_err() {
            warn!(
                scope = %self.scope,
                timeout_ms = timeout.as_millis() as u64,
                "Outbound queue not drained at teardown"
            );
        }

        if let Err(e) = self.port.disconnect().await {
            warn!(scope = %self.scope, error = %e, "Channel disconnect failed");
        }
        if self.store.clear() {
            self.publish_view();
        }
        self.publish_state();
        info!(scope = %self.scope, "Presence scope torn down");
    }

    // ── Inbound events ───────────────────────────────────────────────

    fn handle_event(&mut self, queued: QueuedEvent) {
        if queued.generation != self.reconnect.generation()
            || self.reconnect.state() != ConnectionState::Connected
        {
            PresenceMetrics::incr(&self.links.metrics.events_superseded);
            debug!(
                scope = %self.scope,
                kind = queued.event.kind(),
                generation = queued.generation,
                "Discarding event from a previous connection"
            );
            return;
        }

        let changed = match queued.event {
            ChannelEvent::Sync(state) => self.on_sync(state),
            ChannelEvent::Join(joined) => {
                let records = joined
                    .iter()
                    .filter_map(|value| self.validated(validator::parse_record(value, &self.scope)))
                    .collect();
                self.store.apply_join(records)
            }
            ChannelEvent::Leave(left) => {
                let ids: Vec<UserId> = left
                    .iter()
                    .filter_map(|value| self.validated(validator::parse_leave(value)))
                    .collect();
                self.store.apply_leave(&ids)
            }
            ChannelEvent::Broadcast { event, payload } => self.on_broadcast(&event, &payload),
            ChannelEvent::Status(status) => {
                match status {
                    ChannelStatus::Subscribed => {
                        debug!(scope = %self.scope, "Channel subscribed")
                    }
                    ChannelStatus::Closed => self.fail("channel closed"),
                    ChannelStatus::Error(reason) => self.fail(&reason),
                }
                return;
            }
            // Dropped events cannot be replayed; reconnecting brings a fresh sync.
            ChannelEvent::Overflowed => {
                self.fail("inbound event queue overflowed");
                return;
            }
        };

        if changed {
            PresenceMetrics::incr(&self.links.metrics.events_applied);
            self.publish_view();
        }
    }

    fn on_sync(&mut self, state: HashMap<String, Value>) -> bool {
        let mut snapshot = HashMap::with_capacity(state.len());
        for value in state.values() {
            if let Some(record) = self.validated(validator::parse_record(value, &self.scope)) {
                snapshot.insert(record.user_id.clone(), record);
            }
        }
        self.store.apply_sync(snapshot)
    }

    fn on_broadcast(&mut self, event: &str, payload: &Value) -> bool {
        let Some(broadcast) = self.validated(validator::parse_broadcast(event, payload)) else {
            return false;
        };
        match self.store.apply_broadcast(&broadcast) {
            BroadcastOutcome::Applied | BroadcastOutcome::Removed => true,
            BroadcastOutcome::Stale => {
                PresenceMetrics::incr(&self.links.metrics.updates_stale);
                debug!(scope = %self.scope, user_id = %broadcast.user_id(), event, "Stale update dropped");
                false
            }
            BroadcastOutcome::UnknownPeer => {
                debug!(scope = %self.scope, user_id = %broadcast.user_id(), event, "Update for unknown peer dropped");
                false
            }
            BroadcastOutcome::SelfIgnored => false,
        }
    }

    fn validated<T>(&self, parsed: Result<T, pulseboard_core::AppError>) -> Option<T> {
        match parsed {
            Ok(value) => Some(value),
            Err(e) => {
                PresenceMetrics::incr(&self.links.metrics.events_malformed);
                debug!(scope = %self.scope, error = %e, "Malformed presence payload dropped");
                None
            }
        }
    }

    // ── Heartbeat ────────────────────────────────────────────────────

    fn on_heartbeat(&mut self) {
        let outcome =
            self.heartbeat
                .on_tick(&mut self.store, &mut self.monitor, Utc::now(), Instant::now());

        if !outcome.pruned.is_empty() {
            PresenceMetrics::add(&self.links.metrics.peers_pruned, outcome.pruned.len() as u64);
            self.publish_view();
        }

        match outcome.idle_transition {
            Some(transition) => self.apply_transition(transition),
            None => {
                self.refresh_local(Utc::now());
                self.publish_local();
            }
        }
    }

    // ── Local state and outbound ─────────────────────────────────────

    fn apply_transition(&mut self, transition: StatusTransition) {
        let now = Utc::now();
        self.refresh_local(now);
        info!(
            scope = %self.scope,
            from = %transition.from,
            to = %transition.to,
            reason = ?transition.reason,
            "Local status changed"
        );
        self.publish_local();
        self.send_broadcast(PresenceBroadcast::StatusChange {
            user_id: self.local.user_id.clone(),
            status: transition.to,
            timestamp: now,
        });
    }

    fn refresh_local(&mut self, now: chrono::DateTime<Utc>) {
        self.local.status = self.monitor.status();
        self.local.activity = self.monitor.activity().clone();
        self.local.location = self.monitor.location().map(str::to_string);
        self.local.last_active = now;
        self.links.local.send_replace(self.local.clone());
    }

    /// Fire-and-forget publish of the local record. Skipped while not connected.
    fn publish_local(&self) {
        if self.reconnect.state() == ConnectionState::Connected {
            self.enqueue(Outbound::Publish(self.local.clone()));
        }
    }

    /// Fire-and-forget broadcast. Skipped while not connected.
    fn send_broadcast(&self, broadcast: PresenceBroadcast) {
        if self.reconnect.state() == ConnectionState::Connected {
            self.enqueue(Outbound::Broadcast(broadcast));
        }
    }

    fn enqueue(&self, outbound: Outbound) {
        let Some(queue) = &self.outbound else {
            return;
        };
        if queue.send(outbound).is_err() {
            debug!(scope = %self.scope, "Outbound sender stopped, call dropped");
        }
    }

    fn publish_view(&self) {
        let next = self.store.view();
        self.links.view.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn publish_state(&self) {
        let next = self.reconnect.state();
        self.links.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
