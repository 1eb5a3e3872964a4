//! Configuration validation

use crate::schema::RawConfig;
use crate::settings::{DEFAULT_SESSION_SWEEP_SECS, DEFAULT_SESSION_TTL_SECS, DEFAULT_STATUS_SWEEP_SECS};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("sessions.sweep_interval_seconds ({interval}s) exceeds sessions.ttl_seconds ({ttl}s)")]
    SweepExceedsTtl { interval: u64, ttl: u64 },
}

/// Validate a raw configuration, collecting every error
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let ttl = config.sessions.ttl_seconds.unwrap_or(DEFAULT_SESSION_TTL_SECS);
    let session_sweep = config
        .sessions
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SESSION_SWEEP_SECS);
    let status_sweep = config
        .status
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_STATUS_SWEEP_SECS);

    if ttl == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "sessions.ttl_seconds",
        });
    }
    if session_sweep == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "sessions.sweep_interval_seconds",
        });
    }
    if status_sweep == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "status.sweep_interval_seconds",
        });
    }

    // A sweep slower than the TTL would let sessions linger up to twice as long.
    if ttl > 0 && session_sweep > ttl {
        errors.push(ValidationError::SweepExceedsTtl {
            interval: session_sweep,
            ttl,
        });
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawServiceConfig, RawSessionsConfig, RawStatusConfig};

    fn raw(ttl: Option<u64>, sweep: Option<u64>, status: Option<u64>) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: RawServiceConfig::default(),
            sessions: RawSessionsConfig {
                ttl_seconds: ttl,
                sweep_interval_seconds: sweep,
            },
            status: RawStatusConfig {
                sweep_interval_seconds: status,
            },
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&raw(None, None, None)).is_empty());
    }

    #[test]
    fn zero_values_rejected() {
        let errors = validate_config(&raw(Some(60), Some(0), Some(0)));
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroDuration {
                    field: "sessions.sweep_interval_seconds"
                },
                ValidationError::ZeroDuration {
                    field: "status.sweep_interval_seconds"
                },
            ]
        );
    }

    #[test]
    fn sweep_longer_than_ttl_rejected() {
        let errors = validate_config(&raw(Some(30), Some(60), None));
        assert_eq!(
            errors,
            vec![ValidationError::SweepExceedsTtl {
                interval: 60,
                ttl: 30
            }]
        );
    }

    #[test]
    fn zero_ttl_reports_once() {
        let errors = validate_config(&raw(Some(0), None, None));
        assert_eq!(
            errors,
            vec![ValidationError::ZeroDuration {
                field: "sessions.ttl_seconds"
            }]
        );
    }
}
