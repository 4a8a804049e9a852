use anyhow::{Context, Result};
use pty_manager::{PtyConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Unified config (figment-deserialized from defaults / workbench.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   workbench.toml:  [server]
//                    port = 9100
//
//   env var:         WORKBENCH_SERVER__PORT=9100   (double underscore = nesting)
//
//   CLI flag:        --port 9100                   (wins over both)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub workspace: WorkspaceFileConfig,
    #[serde(default)]
    pub terminal: TerminalFileConfig,
    #[serde(default)]
    pub websocket: WebSocketFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// The directory exposed to clients (lives under `[workspace]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceFileConfig {
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
    /// Entry names left out of tree listings
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for WorkspaceFileConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            exclude: Vec::new(),
        }
    }
}

/// Shell sessions (lives under `[terminal]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TerminalFileConfig {
    /// Defaults to `$SHELL`, then `/bin/bash`
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_term")]
    pub term: String,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

impl Default for TerminalFileConfig {
    fn default() -> Self {
        Self {
            shell: None,
            args: Vec::new(),
            rows: default_rows(),
            cols: default_cols(),
            term: default_term(),
            restart_delay_ms: default_restart_delay_ms(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

/// Per-connection channel sizes (lives under `[websocket]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebSocketFileConfig {
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
    #[serde(default = "default_change_broadcast_capacity")]
    pub change_broadcast_capacity: usize,
}

impl Default for WebSocketFileConfig {
    fn default() -> Self {
        Self {
            send_channel_capacity: default_send_channel_capacity(),
            change_broadcast_capacity: default_change_broadcast_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    9000
}
fn default_workspace_root() -> PathBuf {
    PathBuf::from("./user")
}
fn default_rows() -> u16 {
    24
}
fn default_cols() -> u16 {
    80
}
fn default_term() -> String {
    "xterm-256color".to_string()
}
fn default_restart_delay_ms() -> u64 {
    1000
}
fn default_kill_grace_ms() -> u64 {
    2000
}
fn default_send_channel_capacity() -> usize {
    256
}
fn default_change_broadcast_capacity() -> usize {
    1024
}

/// `$SHELL` if set, otherwise bash.
pub fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/bash".to_string())
}

/// Build a figment that layers: defaults → config file → WORKBENCH_* env vars.
///
/// A missing config file is not an error. Env vars use double-underscore for
/// nesting into sections:
///   `WORKBENCH_WORKSPACE__ROOT=/srv/code`  →  `workspace.root = "/srv/code"`
pub fn load_config(config_file: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("WORKBENCH_").split("__"))
}

/// Values given on the command line. They sit above every figment layer.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub root: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub shell: Option<String>,
}

impl FileConfig {
    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(root) = &overrides.root {
            self.workspace.root = root.clone();
        }
        if let Some(host) = &overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(shell) = &overrides.shell {
            self.terminal.shell = Some(shell.clone());
        }
    }
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub workspace: WorkspaceConfig,
    pub terminal: TerminalConfig,
    pub websocket: WebSocketConfig,
}

#[derive(Clone, Debug)]
pub struct WorkspaceConfig {
    /// As configured; canonicalized when the store is opened
    pub root: PathBuf,
    pub exclude: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct TerminalConfig {
    pub shell: String,
    pub args: Vec<String>,
    pub rows: u16,
    pub cols: u16,
    pub term: String,
    pub restart_delay: Duration,
    pub kill_grace: Duration,
}

#[derive(Clone, Debug)]
pub struct WebSocketConfig {
    /// Outbound messages queued per connection
    pub send_channel_capacity: usize,
    /// Change notifications buffered for slow connections before they lag
    pub change_broadcast_capacity: usize,
}

impl ServerConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        let ip: IpAddr = fc
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid server.host '{}'", fc.server.host))?;

        Ok(Self {
            bind_addr: SocketAddr::new(ip, fc.server.port),
            workspace: WorkspaceConfig {
                root: fc.workspace.root.clone(),
                exclude: fc.workspace.exclude.clone(),
            },
            terminal: TerminalConfig {
                shell: fc.terminal.shell.clone().unwrap_or_else(default_shell),
                args: fc.terminal.args.clone(),
                rows: fc.terminal.rows,
                cols: fc.terminal.cols,
                term: fc.terminal.term.clone(),
                restart_delay: Duration::from_millis(fc.terminal.restart_delay_ms),
                kill_grace: Duration::from_millis(fc.terminal.kill_grace_ms),
            },
            websocket: WebSocketConfig {
                send_channel_capacity: fc.websocket.send_channel_capacity.max(1),
                change_broadcast_capacity: fc.websocket.change_broadcast_capacity.max(1),
            },
        })
    }
}

impl TerminalConfig {
    /// Session settings for shells started in `working_dir`.
    pub fn session_config(&self, working_dir: &Path, event_capacity: usize) -> SessionConfig {
        SessionConfig {
            pty: PtyConfig {
                command: self.shell.clone(),
                args: self.args.clone(),
                working_dir: Some(working_dir.to_path_buf()),
                env: Vec::new(),
                term: self.term.clone(),
                rows: self.rows,
                cols: self.cols,
                kill_grace: self.kill_grace,
            },
            restart_delay: self.restart_delay,
            event_capacity,
        }
    }
}
