//! Shared utilities for alior
//!
//! This crate provides:
//! - ID types (UserId, GroupId, EventId, ClientId)
//! - Clock abstraction and the `dd.mm.yyyy hh:mm` date tokens
//! - The compact duration grammar (`1d2h30m`)
//! - Error taxonomy shared by the core and its collaborators
//! - Default paths for socket, data, and config files

mod duration;
mod error;
mod ids;
mod paths;
mod time;

pub use duration::*;
pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
