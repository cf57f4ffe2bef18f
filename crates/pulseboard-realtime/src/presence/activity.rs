//! Local activity monitor — the online/away/busy/offline state machine of
//! the local user, driven by interaction signals and idle time.

use std::time::Duration;

use tokio::time::Instant;

use pulseboard_core::error::AppError;
use pulseboard_core::types::{Activity, PresenceStatus};

/// Local interaction and attention signals reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionSignal {
    /// Pointer moved.
    Pointer,
    /// Key pressed.
    Key,
    /// Page scrolled.
    Scroll,
    /// Touch input.
    Touch,
    /// Click.
    Click,
    /// Page became hidden.
    Hidden,
    /// Page became visible.
    Visible,
    /// Window lost focus.
    Blur,
    /// Window regained focus.
    Focus,
}

impl InteractionSignal {
    fn loses_attention(self) -> bool {
        matches!(self, Self::Hidden | Self::Blur)
    }
}

/// Why the local status changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    /// First successful connect.
    Connected,
    /// No interaction for the idle threshold.
    Idle,
    /// Page hidden or unfocused.
    AttentionLost,
    /// Interaction, visibility, or focus returned.
    Interaction,
    /// Explicit caller request.
    Requested,
    /// Scope teardown.
    Teardown,
}

/// A local status change to be published and broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    /// Previous status.
    pub from: PresenceStatus,
    /// New status.
    pub to: PresenceStatus,
    /// Cause.
    pub reason: TransitionReason,
}

/// Tracks the local user's status, activity label, and last interaction.
#[derive(Debug)]
pub struct ActivityMonitor {
    status: PresenceStatus,
    activity: Activity,
    location: Option<String>,
    /// Activity to restore when returning from an idle away.
    resume_activity: Option<Activity>,
    last_interaction: Instant,
    idle_threshold: Duration,
    terminated: bool,
}

impl ActivityMonitor {
    /// Creates a monitor for a user that has not connected yet.
    pub fn new(idle_threshold: Duration, now: Instant) -> Self {
        Self {
            status: PresenceStatus::Offline,
            activity: Activity::Browsing,
            location: None,
            resume_activity: None,
            last_interaction: now,
            idle_threshold,
            terminated: false,
        }
    }

    /// Current status.
    pub fn status(&self) -> PresenceStatus {
        self.status
    }

    /// Current activity label.
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Current location.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Time since the last interaction.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_interaction)
    }

    /// When an online user will cross the idle threshold, if ever.
    pub fn idle_deadline(&self) -> Option<Instant> {
        (self.status == PresenceStatus::Online).then(|| self.last_interaction + self.idle_threshold)
    }

    /// Enters `online`/`browsing` on the first successful connect.
    ///
    /// Reconnects keep whatever status the user had.
    pub fn on_connected(&mut self, now: Instant) -> Option<StatusTransition> {
        if self.terminated || self.status != PresenceStatus::Offline {
            return None;
        }
        self.last_interaction = now;
        self.activity = Activity::Browsing;
        self.transition(PresenceStatus::Online, TransitionReason::Connected)
    }

    /// Feeds one interaction or attention signal.
    pub fn on_signal(&mut self, signal: InteractionSignal, now: Instant) -> Option<StatusTransition> {
        if self.terminated {
            return None;
        }

        if signal.loses_attention() {
            return match self.status {
                PresenceStatus::Online => {
                    self.transition(PresenceStatus::Away, TransitionReason::AttentionLost)
                }
                _ => None,
            };
        }

        self.last_interaction = now;
        match self.status {
            PresenceStatus::Away => {
                if let Some(activity) = self.resume_activity.take() {
                    self.activity = activity;
                }
                self.transition(PresenceStatus::Online, TransitionReason::Interaction)
            }
            _ => None,
        }
    }

    /// Moves an online user to away once the idle threshold has passed.
    ///
    /// Fires at most once per crossing: the status is no longer online afterwards.
    pub fn check_idle(&mut self, now: Instant) -> Option<StatusTransition> {
        if self.terminated
            || self.status != PresenceStatus::Online
            || self.idle_for(now) < self.idle_threshold
        {
            return None;
        }
        let previous = std::mem::replace(&mut self.activity, Activity::Idle);
        self.resume_activity = Some(previous);
        self.transition(PresenceStatus::Away, TransitionReason::Idle)
    }

    /// Applies an explicit status request from the caller.
    ///
    /// `offline` is reserved for teardown and rejected, as is any request
    /// after teardown.
    pub fn request_status(
        &mut self,
        status: PresenceStatus,
        now: Instant,
    ) -> Result<Option<StatusTransition>, AppError> {
        if self.terminated {
            return Err(AppError::invalid_transition("Presence scope already torn down"));
        }
        if status == PresenceStatus::Offline {
            return Err(AppError::invalid_transition(
                "Offline is only entered on teardown",
            ));
        }
        self.last_interaction = now;
        if status == PresenceStatus::Online {
            if let Some(activity) = self.resume_activity.take() {
                self.activity = activity;
            }
        }
        Ok(self.transition(status, TransitionReason::Requested))
    }

    /// Changes the activity label and location without touching status.
    /// A `None` location keeps the current one.
    ///
    /// This is not an interaction: it neither resets the idle timer nor
    /// brings an idle-away user back online. The new label replaces the one
    /// that would have been restored on return.
    ///
    /// Returns whether anything changed.
    pub fn set_activity(&mut self, activity: Activity, location: Option<String>) -> bool {
        if self.terminated {
            return false;
        }
        self.resume_activity = None;
        let location = location.or_else(|| self.location.clone());
        let changed = self.activity != activity || self.location != location;
        self.activity = activity;
        self.location = location;
        changed
    }

    /// Enters the terminal offline state.
    pub fn teardown(&mut self) -> Option<StatusTransition> {
        if self.terminated {
            return None;
        }
        self.terminated = true;
        self.transition(PresenceStatus::Offline, TransitionReason::Teardown)
    }

    fn transition(&mut self, to: PresenceStatus, reason: TransitionReason) -> Option<StatusTransition> {
        if self.status == to {
            return None;
        }
        let from = std::mem::replace(&mut self.status, to);
        Some(StatusTransition { from, to, reason })
    }
}
