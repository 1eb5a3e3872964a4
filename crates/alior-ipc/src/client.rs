//! IPC client implementation, as used by a chat gateway

use alior_api::{InboundEvent, OutboundMessage};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::{encode_line, IpcError, IpcResult};

/// Gateway-side connection to aliord
pub struct IpcClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl IpcClient {
    /// Connect to aliord
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Forward one user interaction. Replies arrive through [`IpcClient::next_message`].
    pub async fn send_event(&mut self, event: &InboundEvent) -> IpcResult<()> {
        let line = encode_line(event)?;
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Wait for the next reply addressed to any user
    pub async fn next_message(&mut self) -> IpcResult<OutboundMessage> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(IpcError::ConnectionClosed);
            }
            if !line.trim().is_empty() {
                break;
            }
        }

        let message: OutboundMessage = serde_json::from_str(line.trim())?;
        Ok(message)
    }
}
