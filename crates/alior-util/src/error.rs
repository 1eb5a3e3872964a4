//! Error types for alior

use thiserror::Error;

/// Core error taxonomy for conversation handling
#[derive(Debug, Error)]
pub enum AliorError {
    /// Malformed user input; recovered by re-prompting
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Referenced group, event or user is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Action reserved to a group administrator
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Persistence collaborator failed
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invariant violation inside the core
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AliorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure should reach the operator log at error level
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

pub type Result<T> = std::result::Result<T, AliorError>;
