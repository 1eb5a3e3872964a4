//! Validated settings ready for use by the daemon

use crate::schema::{RawConfig, RawServiceConfig};
use alior_util::{default_data_dir, default_socket_path};
use std::path::PathBuf;
use std::time::Duration;

/// Default idle time before a conversation is discarded
pub const DEFAULT_SESSION_TTL_SECS: u64 = 10 * 60;

/// Default reaper interval
pub const DEFAULT_SESSION_SWEEP_SECS: u64 = 20;

/// Default status sweep interval
pub const DEFAULT_STATUS_SWEEP_SECS: u64 = 60;

/// Validated configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub service: ServiceConfig,
    pub sessions: SessionConfig,
    pub status: StatusConfig,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            sessions: SessionConfig {
                ttl: Duration::from_secs(
                    raw.sessions.ttl_seconds.unwrap_or(DEFAULT_SESSION_TTL_SECS),
                ),
                sweep_interval: Duration::from_secs(
                    raw.sessions
                        .sweep_interval_seconds
                        .unwrap_or(DEFAULT_SESSION_SWEEP_SECS),
                ),
            },
            status: StatusConfig {
                sweep_interval: Duration::from_secs(
                    raw.status
                        .sweep_interval_seconds
                        .unwrap_or(DEFAULT_STATUS_SWEEP_SECS),
                ),
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_raw(RawConfig {
            config_version: crate::CURRENT_CONFIG_VERSION,
            service: Default::default(),
            sessions: Default::default(),
            status: Default::default(),
        })
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
        }
    }
}

/// Conversation session expiry
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

/// Event status resynchronisation
#[derive(Debug, Clone, Copy)]
pub struct StatusConfig {
    pub sweep_interval: Duration,
}
