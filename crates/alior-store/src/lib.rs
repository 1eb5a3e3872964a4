//! Persistence layer for alior
//!
//! Provides:
//! - The [`Store`] trait the conversation core commits through
//! - [`SqliteStore`], the on-disk implementation
//! - [`MemoryStore`], an in-process fake for tests
//!
//! Both implementations keep the membership invariant: a group with members
//! always has an admin, and removing its last membership removes the group.

mod memory;
mod sqlite;
mod traits;

pub use memory::*;
pub use sqlite::*;
pub use traits::*;

use alior_util::AliorError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<StoreError> for AliorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => AliorError::NotFound(what),
            other => AliorError::PersistenceError(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Normalise a chat username for lookups: no leading `@`, lowercase
pub fn normalize_user_name(name: &str) -> String {
    name.trim().trim_start_matches('@').to_lowercase()
}
