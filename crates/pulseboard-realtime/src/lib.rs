//! # pulseboard-realtime
//!
//! Presence and activity engine for Pulseboard. Provides:
//!
//! - Per-scope presence state with last-writer-wins merging and self-exclusion
//! - Local online/away/busy/offline state machine with idle detection
//! - Heartbeat republishing and staleness pruning of silent peers
//! - Channel supervision with exponential-backoff reconnection
//! - In-memory pub/sub hub for single-process use and tests

pub mod bridge;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod presence;

pub use bridge::memory_pubsub::{MemoryChannel, MemoryHub};
pub use connection::state::ConnectionState;
pub use metrics::{MetricsSnapshot, PresenceMetrics};
pub use presence::activity::InteractionSignal;
pub use presence::tracker::{LocalIdentity, PresenceTracker};
pub use presence::view::{PresenceView, StatusCounts};
