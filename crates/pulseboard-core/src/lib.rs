//! # pulseboard-core
//!
//! Core crate for Pulseboard presence. Contains configuration schemas,
//! the shared presence types (user identifiers, scopes, presence records),
//! the [`traits::ChannelPort`] transport boundary, and the unified error
//! system.
//!
//! This crate has **no** internal dependencies on other Pulseboard crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
