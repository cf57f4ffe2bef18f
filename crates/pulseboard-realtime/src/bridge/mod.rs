//! Transport adapters implementing [`pulseboard_core::traits::ChannelPort`].

pub mod memory_pubsub;

pub use memory_pubsub::{MemoryChannel, MemoryHub};
