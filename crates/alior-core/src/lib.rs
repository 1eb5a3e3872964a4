//! Conversation core for alior
//!
//! This crate holds everything between an inbound chat message and the
//! reply sent back:
//! - Per-user session store with last-activity tracking
//! - Dialogue state machine for event, group, and deletion flows
//! - Engine that executes the machine's effects against the store
//! - Expiry reaper and event status sweeper background tasks

mod commands;
mod engine;
mod machine;
pub mod prompts;
mod reaper;
mod sender;
mod session;
mod sessions;
mod status;

pub use commands::*;
pub use engine::*;
pub use machine::*;
pub use reaper::*;
pub use sender::*;
pub use session::*;
pub use sessions::*;
pub use status::*;
