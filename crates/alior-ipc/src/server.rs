//! IPC server implementation

use alior_api::{InboundEvent, OutboundMessage};
use alior_util::ClientId;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{encode_line, IpcError, IpcResult};

/// Outbound messages buffered per gateway before the slowest one starts lagging
const OUTBOUND_CAPACITY: usize = 256;

/// Message from a gateway connection to the service
#[derive(Debug)]
pub enum ServerMessage {
    Inbound {
        client_id: ClientId,
        event: InboundEvent,
    },
    ClientConnected {
        client_id: ClientId,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

/// Cloneable handle for pushing replies to every connected gateway
#[derive(Clone)]
pub struct OutboundHandle {
    tx: broadcast::Sender<OutboundMessage>,
}

impl OutboundHandle {
    /// Queue a message for all gateways. Returns how many will receive it.
    pub fn send(&self, message: OutboundMessage) -> usize {
        match self.tx.send(message) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(dropped)) => {
                debug!(user_id = %dropped.user_id, "No gateway connected, reply dropped");
                0
            }
        }
    }
}

/// Gateway socket server.
///
/// Each connected gateway writes one [`InboundEvent`] per line and receives
/// every [`OutboundMessage`] as one line.
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
    outbound_tx: broadcast::Sender<OutboundMessage>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>>,
}

struct ClientHandle {
    connected_at: DateTime<Local>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_CAPACITY);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            outbound_tx,
            message_tx,
            message_rx: Arc::new(Mutex::new(Some(message_rx))),
        }
    }

    /// Start listening
    pub async fn start(&mut self) -> IpcResult<()> {
        // Remove a stale socket left by a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Readable/writable by owner and group
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "IPC server listening");

        self.listener = Some(listener);

        Ok(())
    }

    /// Get receiver for server messages
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Handle for sending replies from outside the server
    pub fn outbound(&self) -> OutboundHandle {
        OutboundHandle {
            tx: self.outbound_tx.clone(),
        }
    }

    /// Accept connections in a loop
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or(IpcError::NotListening)?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    info!(client_id = %client_id, "Gateway connected");
                    self.handle_client(stream, client_id).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client(&self, stream: UnixStream, client_id: ClientId) {
        let (read_half, write_half) = stream.into_split();

        self.clients.write().await.insert(
            client_id.clone(),
            ClientHandle {
                connected_at: alior_util::now(),
            },
        );

        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
        });

        // Subscribe before the reader starts so no reply to this gateway is missed
        let mut outbound_rx = self.outbound_tx.subscribe();
        let (closed_tx, mut closed_rx) = mpsc::channel::<()>(1);

        let message_tx = self.message_tx.clone();
        let reader_id = client_id.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(client_id = %reader_id, "Gateway disconnected (EOF)");
                        break;
                    }
                    Ok(_) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        match serde_json::from_str::<InboundEvent>(line) {
                            Ok(event) => {
                                let _ = message_tx.send(ServerMessage::Inbound {
                                    client_id: reader_id.clone(),
                                    event,
                                });
                            }
                            Err(e) => {
                                warn!(client_id = %reader_id, error = %e, "Invalid inbound event");
                            }
                        }
                    }
                    Err(e) => {
                        debug!(client_id = %reader_id, error = %e, "Read error");
                        break;
                    }
                }
            }

            let _ = closed_tx.send(()).await;
        });

        let clients = self.clients.clone();
        let message_tx = self.message_tx.clone();
        let writer_id = client_id;

        tokio::spawn(async move {
            let mut writer = write_half;

            loop {
                tokio::select! {
                    _ = closed_rx.recv() => break,

                    received = outbound_rx.recv() => match received {
                        Ok(message) => {
                            let line = match encode_line(&message) {
                                Ok(line) => line,
                                Err(e) => {
                                    error!(error = %e, "Failed to encode outbound message");
                                    continue;
                                }
                            };
                            if let Err(e) = writer.write_all(line.as_bytes()).await {
                                debug!(client_id = %writer_id, error = %e, "Write error");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(client_id = %writer_id, skipped, "Gateway too slow, replies dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            let _ = message_tx.send(ServerMessage::ClientDisconnected {
                client_id: writer_id.clone(),
            });

            if let Some(handle) = clients.write().await.remove(&writer_id) {
                let connected_for = alior_util::now() - handle.connected_at;
                info!(
                    client_id = %writer_id,
                    connected_secs = connected_for.num_seconds(),
                    "Gateway disconnected"
                );
            }
        });
    }

    /// Broadcast a reply to every connected gateway
    pub fn broadcast(&self, message: OutboundMessage) -> usize {
        self.outbound().send(message)
    }

    /// Get connected gateway count
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
