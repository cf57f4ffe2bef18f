//! Presence tracker — the public facade for one scope.
//!
//! Each tracker owns a worker task that is the single writer of its store
//! and activity monitor. Callers talk to it through a command queue and read
//! its state from watch channels, so every method here is non-blocking and
//! infallible.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use pulseboard_core::config::PresenceConfig;
use pulseboard_core::error::AppError;
use pulseboard_core::traits::ChannelPort;
use pulseboard_core::types::scope::validate_channel_name;
use pulseboard_core::types::{Activity, PresenceRecord, PresenceStatus, Scope, UserId};

use super::activity::InteractionSignal;
use super::view::{PresenceView, StatusCounts};
use super::worker::{ScopeWorker, WorkerLinks};
use crate::connection::state::ConnectionState;
use crate::metrics::{MetricsSnapshot, PresenceMetrics};

/// Who the local user is, as advertised to peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Identity key.
    pub user_id: UserId,
    /// Display name.
    pub display_name: String,
    /// Role label.
    pub role: String,
}

impl LocalIdentity {
    /// Creates an identity.
    pub fn new(
        user_id: impl Into<UserId>,
        display_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role: role.into(),
        }
    }
}

/// Requests from the facade to the scope worker.
#[derive(Debug)]
pub(crate) enum Command {
    SetStatus(PresenceStatus),
    SetActivity {
        activity: Activity,
        location: Option<String>,
    },
    Signal(InteractionSignal),
    Reconnect,
    Shutdown(oneshot::Sender<()>),
}

/// Live presence for one scope.
#[derive(Debug)]
pub struct PresenceTracker {
    scope: Scope,
    local_user: UserId,
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<PresenceView>,
    local: watch::Receiver<PresenceRecord>,
    connection: watch::Receiver<ConnectionState>,
    metrics: Arc<PresenceMetrics>,
    /// Cancels the worker when the tracker is dropped.
    _cancel: DropGuard,
}

impl PresenceTracker {
    /// Validates the inputs, spawns the scope worker, and starts connecting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        identity: LocalIdentity,
        scope: Scope,
        port: Arc<dyn ChannelPort>,
        config: PresenceConfig,
    ) -> Result<Self, AppError> {
        config.validate()?;
        if identity.user_id.is_blank() {
            return Err(AppError::validation("Local user id must not be blank"));
        }
        let channel = scope.channel_name();
        validate_channel_name(&channel)?;
        if port.channel_name() != channel {
            return Err(AppError::validation(format!(
                "Channel handle is bound to '{}', not '{channel}'",
                port.channel_name()
            )));
        }

        let local = PresenceRecord {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
            role: identity.role.clone(),
            status: PresenceStatus::Offline,
            activity: Activity::Browsing,
            location: None,
            last_active: Utc::now(),
            scope: channel,
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(PresenceView::default());
        let (local_tx, local_rx) = watch::channel(local.clone());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let metrics = Arc::new(PresenceMetrics::new());
        let cancel = CancellationToken::new();

        let links = WorkerLinks {
            commands: commands_rx,
            view: view_tx,
            local: local_tx,
            state: state_tx,
            metrics: metrics.clone(),
            cancel: cancel.clone(),
        };
        let worker = ScopeWorker::new(local, port, config, links);
        tokio::spawn(worker.run());

        Ok(Self {
            scope,
            local_user: identity.user_id,
            commands: commands_tx,
            view: view_rx,
            local: local_rx,
            connection: state_rx,
            metrics,
            _cancel: cancel.drop_guard(),
        })
    }

    /// Scope this tracker serves.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Remote peers, excluding the local user, ordered by user id.
    pub fn peers(&self) -> Vec<PresenceRecord> {
        self.view.borrow().peers.clone()
    }

    /// Full snapshot of the current view.
    pub fn view(&self) -> PresenceView {
        self.view.borrow().clone()
    }

    /// Remote peer counts by status. `offline` is always zero.
    pub fn counts_by_status(&self) -> StatusCounts {
        self.view.borrow().counts_by_status
    }

    /// The local user's own record.
    pub fn local_status(&self) -> PresenceRecord {
        self.local.borrow().clone()
    }

    /// Whether `user_id` is currently present in the scope.
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.status_of(user_id) != PresenceStatus::Offline
    }

    /// Status of any user in the scope; absent users are offline.
    pub fn status_of(&self, user_id: &UserId) -> PresenceStatus {
        if *user_id == self.local_user {
            return self.local.borrow().status;
        }
        self.view
            .borrow()
            .get(user_id)
            .map(|p| p.status)
            .unwrap_or(PresenceStatus::Offline)
    }

    /// Channel connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Requests a local status change. Fire-and-forget.
    pub fn set_status(&self, status: PresenceStatus) {
        self.send(Command::SetStatus(status));
    }

    /// Updates the local activity label and, if given, location. Fire-and-forget.
    pub fn set_activity(&self, activity: Activity, location: Option<String>) {
        self.send(Command::SetActivity { activity, location });
    }

    /// Reports a local interaction or attention signal.
    pub fn record_signal(&self, signal: InteractionSignal) {
        self.send(Command::Signal(signal));
    }

    /// Asks for an immediate reconnect. No-op while connecting or connected.
    pub fn reconnect(&self) {
        self.send(Command::Reconnect);
    }

    /// Watches the presence view.
    pub fn subscribe(&self) -> watch::Receiver<PresenceView> {
        self.view.clone()
    }

    /// Watches the local record.
    pub fn local_changes(&self) -> watch::Receiver<PresenceRecord> {
        self.local.clone()
    }

    /// Watches the connection state.
    pub fn connection_changes(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    /// Counters for this scope.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Tears the scope down and waits for the worker to finish.
    ///
    /// Safe to call more than once and when the channel never connected.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            debug!(scope = %self.scope, command = ?e.0, "Presence worker stopped, command ignored");
        }
    }
}
