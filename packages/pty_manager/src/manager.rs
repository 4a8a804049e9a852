use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::error::PtyError;
use crate::pty::PtyConfig;
use crate::session::{Session, SessionEvent, SessionId, SessionState, supervise};

/// How sessions are spawned and supervised
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Template for every shell; rows/cols are the initial size
    pub pty: PtyConfig,
    /// Backoff between an unexpected exit and the respawn
    pub restart_delay: Duration,
    /// Events buffered per session before the PTY pump waits on the listener
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pty: PtyConfig::default(),
            restart_delay: Duration::from_secs(1),
            event_capacity: 256,
        }
    }
}

/// Registry of live sessions, one per connection.
///
/// Only connection accept/close should create or terminate entries; the I/O
/// paths hold the `Arc<Session>` returned by [`SessionManager::create_session`]
/// instead of looking the id up again.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawn a shell for `id` and start forwarding its output.
    ///
    /// A session already registered under the same id is terminated first.
    /// Spawn failures are returned to the caller and leave no entry behind.
    pub async fn create_session(
        &self,
        id: SessionId,
    ) -> Result<(Arc<Session>, mpsc::Receiver<SessionEvent>), PtyError> {
        let mut sessions = self.sessions.write().await;

        if let Some(previous) = sessions.remove(&id) {
            warn!(session = %id, "Replacing existing session");
            previous.terminate().await;
        }

        let session = Arc::new(Session::new(id.clone(), &self.config.pty));
        let output = session
            .spawn_pty(&self.config.pty)
            .await?
            .ok_or_else(|| PtyError::NotRunning(id.clone()))?;

        let (events_tx, events_rx) = mpsc::channel(self.config.event_capacity);
        tokio::spawn(supervise(
            session.clone(),
            output,
            self.config.pty.clone(),
            self.config.restart_delay,
            events_tx,
        ));

        sessions.insert(id.clone(), session.clone());
        let pid = session.pid().await;
        info!(session = %id, pid = ?pid, "Session created");
        Ok((session, events_rx))
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Forward input to a session by id.
    pub async fn write(&self, id: &SessionId, data: &[u8]) -> Result<usize, PtyError> {
        let session = self
            .get(id)
            .await
            .ok_or_else(|| PtyError::NoSuchSession(id.clone()))?;
        session.write(data).await
    }

    pub async fn resize(&self, id: &SessionId, rows: u16, cols: u16) -> Result<(), PtyError> {
        let session = self
            .get(id)
            .await
            .ok_or_else(|| PtyError::NoSuchSession(id.clone()))?;
        session.resize(rows, cols).await
    }

    pub async fn state(&self, id: &SessionId) -> Option<SessionState> {
        match self.get(id).await {
            Some(session) => Some(session.state().await),
            None => None,
        }
    }

    /// Remove and kill the session registered under `id`. Returns false if
    /// there was none; calling it twice is harmless.
    pub async fn terminate(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.terminate().await;
                true
            }
            None => {
                debug!(session = %id, "Terminate for unknown session");
                false
            }
        }
    }

    /// Terminate exactly this session. The registry entry is only removed if
    /// it still points at `session`, so a newer session that reused the id is
    /// left alone.
    pub async fn release(&self, session: &Arc<Session>) -> bool {
        {
            let mut sessions = self.sessions.write().await;
            if sessions
                .get(session.id())
                .is_some_and(|current| Arc::ptr_eq(current, session))
            {
                sessions.remove(session.id());
            }
        }
        session.terminate().await
    }

    pub async fn list(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Terminate every session, used on server shutdown.
    pub async fn shutdown_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        let count = drained.len();
        for (_, session) in drained {
            session.terminate().await;
        }
        count
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(10);

    fn manager(script: &str, restart_delay: Duration) -> SessionManager {
        SessionManager::new(SessionConfig {
            pty: PtyConfig {
                command: "/bin/sh".into(),
                args: vec!["-c".into(), script.into()],
                kill_grace: Duration::from_millis(500),
                ..Default::default()
            },
            restart_delay,
            event_capacity: 64,
        })
    }

    async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> Option<SessionEvent> {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for session event")
    }

    /// Collect output until the shell exits.
    async fn output_until_exit(rx: &mut mpsc::Receiver<SessionEvent>) -> String {
        let mut out = Vec::new();
        loop {
            match next_event(rx).await {
                Some(SessionEvent::Output(data)) => out.extend(data),
                Some(SessionEvent::Exited { .. }) | None => break,
                Some(other) => panic!("unexpected event: {other:?}"),
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn restarts_after_unexpected_exit() {
        let mgr = manager("printf ready; exit 0", Duration::from_millis(50));
        let id = SessionId::from("restart");
        let (session, mut rx) = mgr.create_session(id.clone()).await.unwrap();

        assert!(output_until_exit(&mut rx).await.contains("ready"));
        assert_eq!(next_event(&mut rx).await, Some(SessionEvent::Restarted));
        assert!(output_until_exit(&mut rx).await.contains("ready"));
        assert!(session.restarts().await >= 1);

        assert!(mgr.terminate(&id).await);
    }

    #[tokio::test]
    async fn terminate_during_backoff_prevents_restart() {
        let mgr = manager("exit 0", Duration::from_millis(300));
        let id = SessionId::from("backoff");
        let (session, mut rx) = mgr.create_session(id.clone()).await.unwrap();

        output_until_exit(&mut rx).await;
        assert_eq!(session.state().await, SessionState::Exited);

        // Nothing left to kill, but the entry is removed
        assert!(mgr.terminate(&id).await);
        assert!(!mgr.terminate(&id).await);

        // The supervisor ends without restarting
        assert_eq!(next_event(&mut rx).await, None);
        assert_eq!(session.state().await, SessionState::Terminated);
        assert!(mgr.is_empty().await);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let mgr = manager(
            "read line; printf '[%s]' \"$line\"; exit 0",
            Duration::from_secs(30),
        );
        let (a, mut rx_a) = mgr.create_session("a".into()).await.unwrap();
        let (b, mut rx_b) = mgr.create_session("b".into()).await.unwrap();

        a.write(b"alpha\n").await.unwrap();
        b.write(b"beta\n").await.unwrap();

        let out_a = output_until_exit(&mut rx_a).await;
        let out_b = output_until_exit(&mut rx_b).await;
        assert!(out_a.contains("[alpha]"));
        assert!(!out_a.contains("beta"));
        assert!(out_b.contains("[beta]"));
        assert!(!out_b.contains("alpha"));

        assert_eq!(mgr.shutdown_all().await, 2);
    }

    #[tokio::test]
    async fn input_while_exited_is_not_running() {
        let mgr = manager("exit 0", Duration::from_secs(30));
        let id = SessionId::from("exited");
        let (_session, mut rx) = mgr.create_session(id.clone()).await.unwrap();
        output_until_exit(&mut rx).await;

        let err = mgr.write(&id, b"ls\n").await.unwrap_err();
        assert!(err.is_transient());
        mgr.terminate(&id).await;

        assert!(matches!(
            mgr.write(&id, b"ls\n").await,
            Err(PtyError::NoSuchSession(_))
        ));
    }

    #[tokio::test]
    async fn spawn_failure_leaves_no_entry() {
        let mgr = SessionManager::new(SessionConfig {
            pty: PtyConfig {
                command: "/definitely/not/a/shell".into(),
                ..Default::default()
            },
            ..Default::default()
        });
        let result = mgr.create_session("broken".into()).await;
        assert!(matches!(result, Err(PtyError::Spawn { .. })));
        assert!(mgr.is_empty().await);
    }

    #[tokio::test]
    async fn release_ignores_newer_session_with_same_id() {
        let mgr = manager("sleep 30", Duration::from_secs(30));
        let id = SessionId::from("reused");
        let (old, _old_rx) = mgr.create_session(id.clone()).await.unwrap();
        let (new, _new_rx) = mgr.create_session(id.clone()).await.unwrap();

        // Replacing already terminated the old session
        assert!(old.is_terminated());
        assert!(!mgr.release(&old).await);
        assert!(Arc::ptr_eq(&mgr.get(&id).await.unwrap(), &new));

        assert!(mgr.release(&new).await);
        assert!(mgr.is_empty().await);
    }
}
