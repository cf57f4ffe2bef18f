//! Presence message types and payload validation.

pub mod types;
pub mod validator;

pub use types::{ChannelEvent, PresenceBroadcast, QueuedEvent};
