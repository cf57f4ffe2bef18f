//! Core type definitions used across the Pulseboard workspace.

pub mod id;
pub mod presence;
pub mod scope;

pub use id::UserId;
pub use presence::{Activity, PresenceRecord, PresenceStatus};
pub use scope::Scope;
