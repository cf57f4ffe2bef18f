//! Presence tracking: reconciliation store, local activity state machine,
//! heartbeat, the per-scope worker, and the public tracker facade.

pub mod activity;
pub mod heartbeat;
pub mod store;
pub mod tracker;
pub mod view;
mod worker;

pub use activity::{ActivityMonitor, InteractionSignal, StatusTransition};
pub use heartbeat::HeartbeatScheduler;
pub use store::PresenceStateStore;
pub use tracker::{LocalIdentity, PresenceTracker};
pub use view::{PresenceView, StatusCounts};
