//! Gateway endpoint for aliord
//!
//! A chat gateway (Telegram poller, test harness, ...) connects over a Unix
//! socket and speaks newline-delimited JSON: one [`alior_api::InboundEvent`]
//! per line in, one [`alior_api::OutboundMessage`] per line out.

mod client;
mod server;

pub use client::*;
pub use server::*;

use serde::Serialize;
use thiserror::Error;

/// Gateway endpoint errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed line: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Peer closed the connection")]
    ConnectionClosed,

    #[error("Socket is not bound; call start() first")]
    NotListening,
}

pub type IpcResult<T> = Result<T, IpcError>;

/// Encode a value as one protocol line, newline included
pub(crate) fn encode_line<T: Serialize>(value: &T) -> IpcResult<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}
