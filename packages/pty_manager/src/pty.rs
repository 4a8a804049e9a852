use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, warn};

use crate::error::PtyError;

/// Chunks buffered between the reader thread and the consumer. When full the
/// reader thread blocks, which stalls only this PTY.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;
const INPUT_CHANNEL_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 4096;
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Configuration for spawning a PTY
#[derive(Clone, Debug)]
pub struct PtyConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Added on top of the inherited process environment
    pub env: Vec<(String, String)>,
    pub term: String,
    pub rows: u16,
    pub cols: u16,
    /// How long a hung-up process gets before it is SIGKILLed
    pub kill_grace: Duration,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            command: "/bin/bash".to_string(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            term: "xterm-256color".to_string(),
            rows: 24,
            cols: 80,
            kill_grace: Duration::from_secs(2),
        }
    }
}

/// State of a PTY process
#[derive(Clone, Debug)]
pub struct PtyState {
    pub running: bool,
    pub pid: Option<u32>,
    pub command: String,
    pub rows: u16,
    pub cols: u16,
}

/// Everything a PTY produces, in the order it was produced.
///
/// `Exited` is always the last item on the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PtyOutput {
    Data(Vec<u8>),
    Exited { exit_code: Option<u32> },
}

/// Control messages handled by the PTY actor
pub(crate) enum PtyMessage {
    Resize {
        rows: u16,
        cols: u16,
        respond_to: oneshot::Sender<Result<(), PtyError>>,
    },
    GetState {
        respond_to: oneshot::Sender<PtyState>,
    },
    Kill {
        respond_to: oneshot::Sender<Result<(), PtyError>>,
    },
}

/// Handle to communicate with a PTY actor.
///
/// Dropping every clone of the handle hangs up the process.
#[derive(Clone)]
pub struct PtyHandle {
    sender: mpsc::Sender<PtyMessage>,
    input_tx: mpsc::Sender<Vec<u8>>,
    pid: Option<u32>,
}

impl PtyHandle {
    /// Queue bytes for the PTY's input. Waits only when this PTY's input
    /// queue is full.
    pub async fn write(&self, data: &[u8]) -> Result<usize, PtyError> {
        self.input_tx
            .send(data.to_vec())
            .await
            .map_err(|_| PtyError::Write("PTY input closed".into()))?;
        Ok(data.len())
    }

    pub async fn write_str(&self, text: &str) -> Result<usize, PtyError> {
        self.write(text.as_bytes()).await
    }

    pub async fn resize(&self, rows: u16, cols: u16) -> Result<(), PtyError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PtyMessage::Resize {
                rows,
                cols,
                respond_to: tx,
            })
            .await
            .map_err(|_| PtyError::Channel("Failed to send resize message".into()))?;
        rx.await
            .map_err(|_| PtyError::Channel("Failed to receive resize response".into()))?
    }

    pub async fn state(&self) -> Result<PtyState, PtyError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PtyMessage::GetState { respond_to: tx })
            .await
            .map_err(|_| PtyError::Channel("Failed to send state message".into()))?;
        rx.await
            .map_err(|_| PtyError::Channel("Failed to receive state response".into()))
    }

    /// Hang up the process. Returns once the signal is sent; the process is
    /// SIGKILLed if it is still alive after the configured grace period.
    pub async fn kill(&self) -> Result<(), PtyError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PtyMessage::Kill { respond_to: tx })
            .await
            .map_err(|_| PtyError::Channel("Failed to send kill message".into()))?;
        rx.await
            .map_err(|_| PtyError::Channel("Failed to receive kill response".into()))?
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// The PTY actor that owns a single PTY process
pub struct PtyActor {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    state: PtyState,
    kill_grace: Duration,
    receiver: mpsc::Receiver<PtyMessage>,
    output_tx: mpsc::Sender<PtyOutput>,
}

impl PtyActor {
    /// Spawn a new PTY process. Must be called from within a tokio runtime.
    ///
    /// Returns the control handle and the ordered output stream.
    pub fn spawn(config: PtyConfig) -> Result<(PtyHandle, mpsc::Receiver<PtyOutput>), PtyError> {
        let spawn_err = |reason: String| PtyError::Spawn {
            command: config.command.clone(),
            reason,
        };

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| spawn_err(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(&config.command);
        cmd.args(&config.args);
        if let Some(dir) = &config.working_dir {
            cmd.cwd(dir);
        }
        cmd.env("TERM", &config.term);
        cmd.env("COLORTERM", "truecolor");
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!("Failed to spawn command '{}': {}", config.command, e);
            spawn_err(e.to_string())
        })?;
        // The child holds its own copy; keeping ours open would hide EOF.
        drop(pair.slave);

        let pid = child.process_id();
        info!(command = %config.command, ?pid, "PTY process started");

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| spawn_err(format!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| spawn_err(format!("failed to take PTY writer: {e}")))?;

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (eof_tx, eof_rx) = oneshot::channel();

        spawn_reader_thread(reader, output_tx.clone(), eof_tx, pid)
            .map_err(|e| spawn_err(format!("failed to start reader thread: {e}")))?;
        spawn_writer_thread(writer, input_rx, pid)
            .map_err(|e| spawn_err(format!("failed to start writer thread: {e}")))?;

        let actor = Self {
            master: pair.master,
            child,
            state: PtyState {
                running: true,
                pid,
                command: config.command.clone(),
                rows: config.rows,
                cols: config.cols,
            },
            kill_grace: config.kill_grace,
            receiver: msg_rx,
            output_tx,
        };
        tokio::spawn(actor.run(eof_rx));

        Ok((
            PtyHandle {
                sender: msg_tx,
                input_tx,
                pid,
            },
            output_rx,
        ))
    }

    async fn run(mut self, mut eof_rx: oneshot::Receiver<()>) {
        debug!(pid = ?self.state.pid, "PTY actor started");

        let mut handles_open = true;
        let mut kill_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                msg = self.receiver.recv(), if handles_open => match msg {
                    Some(msg) => self.handle_message(msg, &mut kill_deadline),
                    None => {
                        debug!(pid = ?self.state.pid, "All PTY handles dropped, hanging up");
                        handles_open = false;
                        if kill_deadline.is_none() && self.hang_up().is_ok() {
                            kill_deadline = Some(Instant::now() + self.kill_grace);
                        }
                    }
                },
                _ = &mut eof_rx => break,
                _ = sleep_until(kill_deadline.unwrap_or_else(Instant::now)), if kill_deadline.is_some() => {
                    warn!(pid = ?self.state.pid, "PTY process ignored hangup, sending SIGKILL");
                    if let Err(e) = self.child.kill() {
                        warn!(pid = ?self.state.pid, "SIGKILL failed: {}", e);
                    }
                    kill_deadline = None;
                }
            }
        }

        let exit_code = self.reap().await;
        self.state.running = false;
        info!(pid = ?self.state.pid, ?exit_code, "PTY process exited");
        let _ = self.output_tx.send(PtyOutput::Exited { exit_code }).await;
    }

    fn handle_message(&mut self, msg: PtyMessage, kill_deadline: &mut Option<Instant>) {
        match msg {
            PtyMessage::Resize {
                rows,
                cols,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_resize(rows, cols));
            }
            PtyMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state.clone());
            }
            PtyMessage::Kill { respond_to } => {
                let result = if kill_deadline.is_some() {
                    Ok(())
                } else {
                    self.hang_up()
                };
                if result.is_ok() && kill_deadline.is_none() {
                    *kill_deadline = Some(Instant::now() + self.kill_grace);
                }
                let _ = respond_to.send(result);
            }
        }
    }

    fn handle_resize(&mut self, rows: u16, cols: u16) -> Result<(), PtyError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Resize(e.to_string()))?;

        self.state.rows = rows;
        self.state.cols = cols;
        Ok(())
    }

    /// Send SIGHUP, the signal a closing terminal delivers. Interactive shells
    /// ignore SIGTERM but exit on hangup.
    fn hang_up(&mut self) -> Result<(), PtyError> {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = self.state.pid {
                match kill(Pid::from_raw(pid as i32), Signal::SIGHUP) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => return Err(PtyError::Kill(e.to_string())),
                }
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            self.child
                .kill()
                .map_err(|e| PtyError::Kill(e.to_string()))
        }
    }

    /// Collect the exit status. EOF on the master can arrive slightly before
    /// the process is reapable, so poll for a bounded time.
    async fn reap(&mut self) -> Option<u32> {
        let mut deadline = Instant::now() + self.kill_grace;
        let mut escalated = false;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status.exit_code()),
                Ok(None) if Instant::now() < deadline => sleep(REAP_POLL_INTERVAL).await,
                Ok(None) if !escalated => {
                    warn!(pid = ?self.state.pid, "PTY closed but process still alive, killing");
                    let _ = self.child.kill();
                    escalated = true;
                    deadline = Instant::now() + self.kill_grace;
                }
                Ok(None) => {
                    error!(pid = ?self.state.pid, "Giving up reaping PTY process");
                    return None;
                }
                Err(e) => {
                    warn!(pid = ?self.state.pid, "Failed to reap PTY process: {}", e);
                    return None;
                }
            }
        }
    }
}

fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    output_tx: mpsc::Sender<PtyOutput>,
    eof_tx: oneshot::Sender<()>,
    pid: Option<u32>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-reader-{}", pid.unwrap_or_default()))
        .spawn(move || {
            let mut buffer = vec![0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx
                            .blocking_send(PtyOutput::Data(buffer[..n].to_vec()))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    // Linux reports EIO once the slave side is closed
                    Err(e) => {
                        debug!(?pid, "PTY read ended: {}", e);
                        break;
                    }
                }
            }
            let _ = eof_tx.send(());
        })
        .map(|_| ())
}

fn spawn_writer_thread(
    mut writer: Box<dyn Write + Send>,
    mut input_rx: mpsc::Receiver<Vec<u8>>,
    pid: Option<u32>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-writer-{}", pid.unwrap_or_default()))
        .spawn(move || {
            while let Some(data) = input_rx.blocking_recv() {
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    warn!(?pid, "Failed to write to PTY: {}", e);
                    break;
                }
            }
        })
        .map(|_| ())
}
