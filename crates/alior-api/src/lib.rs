//! Shared types for alior
//!
//! This crate defines the types every other crate agrees on:
//! - Inbound events and outbound messages exchanged with the chat gateway
//! - Event categories and lifecycle statuses
//! - Persisted records (users, groups, memberships, events)

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// Current gateway protocol version
pub const API_VERSION: u32 = 1;
