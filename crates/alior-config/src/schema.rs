//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Process-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Conversation session expiry
    #[serde(default)]
    pub sessions: RawSessionsConfig,

    /// Event status resynchronisation
    #[serde(default)]
    pub status: RawStatusConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Gateway socket path (default: $XDG_RUNTIME_DIR/alior/alior.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the SQLite store
    pub data_dir: Option<PathBuf>,
}

/// Session expiry settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessionsConfig {
    /// Idle time after which a conversation is discarded
    pub ttl_seconds: Option<u64>,

    /// How often the reaper sweeps the session store
    pub sweep_interval_seconds: Option<u64>,
}

/// Status sweep settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStatusConfig {
    /// How often stored event statuses are recomputed
    pub sweep_interval_seconds: Option<u64>,
}
