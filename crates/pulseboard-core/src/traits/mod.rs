//! Core traits defined in `pulseboard-core` and implemented by other crates.

pub mod channel;

pub use channel::{
    BroadcastHandler, ChannelPort, ChannelStatus, MembershipHandler, PresenceSyncHandler,
    StatusHandler,
};
