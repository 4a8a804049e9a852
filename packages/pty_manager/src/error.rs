use crate::session::SessionId;

/// Errors that can occur during PTY and session operations
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    /// The shell could not be started at all (missing executable, no PTY available)
    #[error("failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    /// No session is registered under this id
    #[error("no such session: {0}")]
    NoSuchSession(SessionId),

    /// The session exists but has no live process (exited, restarting or terminated)
    #[error("session {0} is not running")]
    NotRunning(SessionId),

    #[error("failed to write to PTY: {0}")]
    Write(String),

    #[error("failed to resize PTY: {0}")]
    Resize(String),

    #[error("failed to kill PTY process: {0}")]
    Kill(String),

    /// The PTY actor is gone
    #[error("channel error: {0}")]
    Channel(String),
}

impl PtyError {
    /// Errors that callers may drop silently: the session is between processes
    /// or already torn down.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotRunning(_) | Self::NoSuchSession(_))
    }
}
