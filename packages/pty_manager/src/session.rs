//! One supervised shell per connection.
//!
//! A [`Session`] owns at most one live PTY at a time. Its lifecycle is
//! `Unstarted → Running → Exited → (Restarting → Running)* → Terminated`:
//! the supervisor task drives the `Exited`/`Restarting` edges, and
//! [`Session::terminate`] is the only way into `Terminated` apart from a
//! failed respawn.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::PtyError;
use crate::pty::{PtyActor, PtyConfig, PtyHandle, PtyOutput};

/// Identity of the connection that owns a session
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Running,
    Exited,
    Restarting,
    Terminated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Restarting => "restarting",
            Self::Terminated => "terminated",
        }
    }
}

/// What a session reports to its owning connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Bytes from the PTY, in production order
    Output(Vec<u8>),
    /// The shell exited on its own; a restart follows after the backoff
    Exited { exit_code: Option<u32> },
    /// A fresh shell is running under the same session
    Restarted,
    /// The shell could not be respawned; the session is terminated
    Failed(String),
}

struct SessionInner {
    state: SessionState,
    pty: Option<PtyHandle>,
    rows: u16,
    cols: u16,
    restarts: u32,
}

pub struct Session {
    id: SessionId,
    working_dir: Option<PathBuf>,
    inner: Mutex<SessionInner>,
    cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(id: SessionId, template: &PtyConfig) -> Self {
        Self {
            id,
            working_dir: template.working_dir.clone(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Unstarted,
                pty: None,
                rows: template.rows,
                cols: template.cols,
                restarts: 0,
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn restarts(&self) -> u32 {
        self.inner.lock().await.restarts
    }

    pub async fn pid(&self) -> Option<u32> {
        self.inner.lock().await.pty.as_ref().and_then(|p| p.pid())
    }

    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Forward input to the live PTY. Fails with `NotRunning` while the shell
    /// is exited or restarting.
    pub async fn write(&self, data: &[u8]) -> Result<usize, PtyError> {
        let pty = self.live_pty().await?;
        pty.write(data).await
    }

    /// Resize the live PTY. The size is remembered for restarted shells even
    /// when no PTY is currently running.
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<(), PtyError> {
        let pty = {
            let mut inner = self.inner.lock().await;
            inner.rows = rows;
            inner.cols = cols;
            inner.pty.clone()
        };
        match pty {
            Some(pty) => pty.resize(rows, cols).await,
            None => Ok(()),
        }
    }

    async fn live_pty(&self) -> Result<PtyHandle, PtyError> {
        let inner = self.inner.lock().await;
        match (&inner.state, &inner.pty) {
            (SessionState::Running, Some(pty)) => Ok(pty.clone()),
            _ => Err(PtyError::NotRunning(self.id.clone())),
        }
    }

    /// Spawn a PTY for this session unless it has been terminated.
    ///
    /// Runs under the session lock, so a concurrent `terminate` either sees
    /// the new handle and kills it, or has already cancelled and no process is
    /// started.
    pub(crate) async fn spawn_pty(
        &self,
        template: &PtyConfig,
    ) -> Result<Option<mpsc::Receiver<PtyOutput>>, PtyError> {
        let mut inner = self.inner.lock().await;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let restarting = inner.state != SessionState::Unstarted;
        if restarting {
            inner.state = SessionState::Restarting;
        }

        let config = PtyConfig {
            rows: inner.rows,
            cols: inner.cols,
            ..template.clone()
        };
        match PtyActor::spawn(config) {
            Ok((pty, output)) => {
                inner.pty = Some(pty);
                inner.state = SessionState::Running;
                if restarting {
                    inner.restarts += 1;
                }
                Ok(Some(output))
            }
            Err(e) => {
                inner.state = SessionState::Terminated;
                self.cancel.cancel();
                Err(e)
            }
        }
    }

    /// Record an exit that nobody asked for. Returns false when the session
    /// was terminated in the meantime.
    async fn mark_exited(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if self.cancel.is_cancelled() {
            return false;
        }
        inner.state = SessionState::Exited;
        inner.pty = None;
        true
    }

    /// Stop the session for good. Idempotent: only the first call finds a
    /// process to kill, later calls return false.
    pub(crate) async fn terminate(&self) -> bool {
        self.cancel.cancel();
        let pty = {
            let mut inner = self.inner.lock().await;
            inner.state = SessionState::Terminated;
            inner.pty.take()
        };
        match pty {
            Some(pty) => {
                if let Err(e) = pty.kill().await {
                    debug!(session = %self.id, "Kill after exit: {}", e);
                }
                info!(session = %self.id, "Session terminated");
                true
            }
            None => false,
        }
    }
}

/// Pump PTY output to the owning connection and restart the shell when it
/// exits on its own. Ends when the session is terminated, the respawn fails,
/// or the connection stops listening.
pub(crate) async fn supervise(
    session: Arc<Session>,
    mut output: mpsc::Receiver<PtyOutput>,
    template: PtyConfig,
    restart_delay: Duration,
    events: mpsc::Sender<SessionEvent>,
) {
    loop {
        let exit_code = loop {
            tokio::select! {
                biased;
                _ = session.cancel.cancelled() => return,
                item = output.recv() => match item {
                    Some(PtyOutput::Data(data)) => {
                        if events.send(SessionEvent::Output(data)).await.is_err() {
                            debug!(session = %session.id, "Session listener gone, stopping pump");
                            return;
                        }
                    }
                    Some(PtyOutput::Exited { exit_code }) => break exit_code,
                    None => break None,
                },
            }
        };

        if !session.mark_exited().await {
            return;
        }
        info!(
            session = %session.id,
            ?exit_code,
            "Shell exited, restarting in {}ms",
            restart_delay.as_millis()
        );
        let _ = events.send(SessionEvent::Exited { exit_code }).await;

        tokio::select! {
            _ = session.cancel.cancelled() => return,
            _ = tokio::time::sleep(restart_delay) => {}
        }

        match session.spawn_pty(&template).await {
            Ok(Some(next)) => {
                output = next;
                if events.send(SessionEvent::Restarted).await.is_err() {
                    warn!(session = %session.id, "Restarted shell has no listener");
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                error!(session = %session.id, "Failed to restart shell: {}", e);
                let _ = events.send(SessionEvent::Failed(e.to_string())).await;
                return;
            }
        }
    }
}
