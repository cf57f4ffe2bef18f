//! Channel connection lifecycle — state, reconnection, backoff.

pub mod backoff;
pub mod reconnect;
pub mod state;

pub use backoff::Backoff;
pub use reconnect::ReconnectionManager;
pub use state::ConnectionState;
