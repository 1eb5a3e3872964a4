//! aliord - the alior conversation service
//!
//! This is the main entry point for the aliord service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Session store and conversation engine
//! - Session reaper and event status sweeper
//! - Gateway socket (IPC server)

use alior_api::OutboundMessage;
use alior_config::{load_config_or_default, Settings};
use alior_core::{Engine, Reaper, Sender, SessionStore, StatusSweeper};
use alior_ipc::{IpcServer, OutboundHandle, ServerMessage};
use alior_store::{SqliteStore, Store};
use alior_util::{default_config_path, format_duration, parse_duration, Clock, SystemClock};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// aliord - conversational scheduling assistant service
#[derive(Parser, Debug)]
#[command(name = "aliord")]
#[command(about = "Conversational event and group scheduling service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/alior/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set ALIOR_SOCKET env var)
    #[arg(short, long, env = "ALIOR_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set ALIOR_DATA_DIR env var)
    #[arg(short, long, env = "ALIOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Idle time before an unfinished dialogue is dropped, e.g. `10m` or `1h30m`
    #[arg(long, env = "ALIOR_SESSION_TTL", value_parser = parse_ttl)]
    session_ttl: Option<Duration>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn parse_ttl(s: &str) -> std::result::Result<Duration, String> {
    match parse_duration(s) {
        Ok(d) if d.is_zero() => Err("session TTL must be greater than zero".into()),
        Ok(d) => Ok(d),
        Err(e) => Err(e.to_string()),
    }
}

/// Delivers engine replies to every connected gateway
struct GatewaySender {
    outbound: OutboundHandle,
}

impl Sender for GatewaySender {
    fn send(&self, message: OutboundMessage) {
        let user_id = message.user_id;
        let receivers = self.outbound.send(message);
        debug!(user_id = %user_id, receivers, "Reply queued");
    }
}

/// Main service state
struct Service {
    settings: Settings,
    engine: Arc<Engine>,
    sessions: Arc<SessionStore>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ipc: Arc<IpcServer>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        // Load configuration
        let mut settings = load_config_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        if let Some(ttl) = args.session_ttl {
            settings.sessions.ttl = ttl;
        }
        if let Some(socket) = &args.socket {
            settings.service.socket_path = socket.clone();
        }
        if let Some(data_dir) = &args.data_dir {
            settings.service.data_dir = data_dir.clone();
        }

        if settings.sessions.sweep_interval > settings.sessions.ttl {
            warn!(
                ttl = %format_duration(settings.sessions.ttl),
                sweep_secs = settings.sessions.sweep_interval.as_secs(),
                "Session sweep interval exceeds the TTL; sessions will outlive it"
            );
        }

        info!(
            config_path = %args.config.display(),
            session_ttl = %format_duration(settings.sessions.ttl),
            "Configuration loaded"
        );

        // Create data directory
        let data_dir = &settings.service.data_dir;
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        // Initialize store
        let db_path = data_dir.join("alior.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        // Initialize IPC server
        let socket_path = settings.service.socket_path.clone();
        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        // Initialize conversation core
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        if alior_util::is_mock_time_active() {
            warn!("Mock time is active, dates are shifted");
        }
        let sessions = Arc::new(SessionStore::new(clock.clone()));
        let sender = Arc::new(GatewaySender {
            outbound: ipc.outbound(),
        });
        let engine = Arc::new(Engine::new(sessions.clone(), store.clone(), sender));

        Ok(Self {
            settings,
            engine,
            sessions,
            store,
            clock,
            ipc: Arc::new(ipc),
        })
    }

    async fn run(self) -> Result<()> {
        let mut ipc_messages = self
            .ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        // Spawn IPC accept task
        let ipc_accept = self.ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Background tasks
        let reaper = Reaper::start(
            self.sessions.clone(),
            self.settings.sessions.sweep_interval,
            self.settings.sessions.ttl,
        );
        let sweeper = StatusSweeper::start(
            self.store.clone(),
            self.clock.clone(),
            self.settings.status.sweep_interval,
        );

        // Set up signal handlers
        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                message = ipc_messages.recv() => match message {
                    Some(message) => self.handle_ipc_message(message),
                    None => {
                        warn!("IPC message channel closed");
                        break;
                    }
                },
            }
        }

        // Graceful shutdown
        info!("Shutting down aliord");

        reaper.stop().await;
        sweeper.stop().await;
        self.ipc.shutdown();

        info!(
            open_sessions = self.sessions.len(),
            "Shutdown complete"
        );
        Ok(())
    }

    fn handle_ipc_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::Inbound { client_id, event } => {
                debug!(client_id = %client_id, user_id = %event.user_id, "Inbound event");

                // Store calls block, so each event runs on the blocking pool
                let engine = self.engine.clone();
                tokio::task::spawn_blocking(move || engine.handle_inbound(event));
            }
            ServerMessage::ClientConnected { client_id } => {
                debug!(client_id = %client_id, "Gateway attached");
            }
            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Gateway detached");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "aliord starting"
    );

    let service = Service::new(&args).await?;
    service.run().await
}
