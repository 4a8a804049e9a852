use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::Parser;
use pty_manager::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;
use workspace_fs::{WorkspaceStore, WorkspaceWatcher};

mod config;
mod error;
mod files;
mod handlers;
mod metrics;
mod ws;

#[cfg(test)]
mod test_helpers;

use crate::config::{CliOverrides, FileConfig, ServerConfig};
use crate::metrics::ServerMetrics;
use crate::ws::ChangeHub;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "workbench")]
#[command(about = "Shell sessions and live file sync for a shared workspace")]
struct Cli {
    /// Config file (missing file is fine)
    #[arg(long, default_value = "workbench.toml")]
    config: PathBuf,

    /// Workspace directory exposed to clients
    #[arg(long)]
    root: Option<PathBuf>,

    /// Address to bind
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Shell started for every connection
    #[arg(long)]
    shell: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            root: self.root.clone(),
            host: self.host.clone(),
            port: self.port,
            shell: self.shell.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<WorkspaceStore>,
    pub sessions: Arc<SessionManager>,
    pub hub: Arc<ChangeHub>,
    pub config: Arc<ServerConfig>,
    pub metrics: Arc<ServerMetrics>,
}

impl AppState {
    /// Open the workspace and wire up the shared services. Fails if the root
    /// does not exist.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let store = WorkspaceStore::open(&config.workspace.root)
            .with_context(|| {
                format!(
                    "Failed to open workspace {}",
                    config.workspace.root.display()
                )
            })?
            .with_exclude(config.workspace.exclude.clone());
        let sessions = SessionManager::new(
            config
                .terminal
                .session_config(store.root(), config.websocket.send_channel_capacity),
        );
        let hub = ChangeHub::new(config.websocket.change_broadcast_capacity);

        Ok(Self {
            store: Arc::new(store),
            sessions: Arc::new(sessions),
            hub: Arc::new(hub),
            config: Arc::new(config),
            metrics: Arc::new(ServerMetrics::new()),
        })
    }
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/files", get(files::get_file_tree))
        .route(
            "/files/content",
            get(files::get_file_content).post(files::save_file_content),
        )
        .route("/ws", get(handlers::websocket_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "workbench=debug,pty_manager=debug,workspace_fs=debug,tower_http=debug,info"
    } else {
        "workbench=info,pty_manager=info,workspace_fs=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut file_config: FileConfig = config::load_config(&cli.config)
        .extract()
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;
    file_config.apply_overrides(&cli.overrides());
    let server_config = ServerConfig::from_file(&file_config)?;
    let bind_addr = server_config.bind_addr;

    info!("Starting workbench");

    let state = AppState::new(server_config)?;
    info!("Workspace root: {}", state.store.root().display());
    info!("Shell: {}", state.config.terminal.shell);

    // Without change notifications clients would go stale, so this is fatal
    let (watcher, changes) =
        WorkspaceWatcher::start(state.store.root()).context("Failed to watch workspace")?;
    let pump = state.hub.spawn_pump(changes, state.metrics.clone());

    let sessions_for_shutdown = state.sessions.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    let actual_addr = listener.local_addr()?;

    info!("Workbench listening on http://{}", actual_addr);
    info!("Endpoints:");
    info!("  GET    /files               - Workspace tree");
    info!("  GET    /files/content?path= - File content");
    info!("  POST   /files/content       - Save file");
    info!("  GET    /ws                  - Terminal and file sync channel");

    // Create shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    // Run server with graceful shutdown
    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    info!("Stopping shell sessions...");
    let stopped = sessions_for_shutdown.shutdown_all().await;
    info!("Stopped {} sessions", stopped);

    watcher.stop();
    pump.abort();

    info!("Shutdown complete");
    server_result
}
