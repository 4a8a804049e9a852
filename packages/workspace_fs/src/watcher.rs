//! Recursive workspace watcher.
//!
//! Contains the [`WorkspaceWatcher`] that observes the workspace root using the
//! `notify` crate and publishes every change on a single channel. Events are
//! neither debounced nor coalesced; a recursive copy produces one event per
//! file touched.

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{Result, WorkspaceError};
use crate::path::WorkspaceRoot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Modify,
    Remove,
    Rename,
    Other,
}

impl ChangeKind {
    /// Map a notify event kind. Access events are not changes.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Access(_) => None,
            EventKind::Create(_) => Some(Self::Create),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Rename),
            EventKind::Modify(_) => Some(Self::Modify),
            EventKind::Remove(_) => Some(Self::Remove),
            EventKind::Any | EventKind::Other => Some(Self::Other),
        }
    }
}

/// One filesystem change, path relative to the workspace root
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileChangeEvent {
    pub kind: ChangeKind,
    pub path: String,
}

/// Watches the workspace root recursively until stopped or dropped.
pub struct WorkspaceWatcher {
    root: WorkspaceRoot,
    watcher: RecommendedWatcher,
}

impl WorkspaceWatcher {
    /// Start watching `root`.
    ///
    /// The callback runs on notify's own thread; events are handed to the
    /// returned receiver without blocking it. Failing to establish the watch
    /// is an error the caller is expected to treat as fatal.
    pub fn start(
        root: impl AsRef<Path>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<FileChangeEvent>)> {
        let display = root.as_ref().display().to_string();
        let root = WorkspaceRoot::new(root).map_err(|e| WorkspaceError::Watch {
            path: display.clone(),
            reason: e.to_string(),
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let callback_root = root.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let Some(kind) = ChangeKind::from_event_kind(&event.kind) else {
                        return;
                    };
                    for path in &event.paths {
                        if let Some(path) = callback_root.relativize(path) {
                            debug!(?kind, path = %path, "Workspace change");
                            if tx.send(FileChangeEvent { kind, path }).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => error!("Workspace watcher error: {e}"),
            },
            notify::Config::default(),
        )
        .map_err(|e| WorkspaceError::Watch {
            path: display.clone(),
            reason: format!("failed to create watcher: {e}"),
        })?;

        watcher
            .watch(root.path(), RecursiveMode::Recursive)
            .map_err(|e| WorkspaceError::Watch {
                path: display,
                reason: e.to_string(),
            })?;

        info!("Watching workspace {}", root.path().display());
        Ok((Self { root, watcher }, rx))
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Release the OS watch. Dropping the watcher does the same; this just
    /// makes the release explicit and logged. The event channel closes once
    /// notify's thread lets go of the sender.
    pub fn stop(mut self) {
        if let Err(e) = self.watcher.unwatch(self.root.path()) {
            warn!("Failed to unwatch {}: {e}", self.root.path().display());
        }
        info!("Stopped watching {}", self.root.path().display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use std::time::Duration;

    #[test]
    fn event_kinds_map() {
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Create)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            Some(ChangeKind::Modify)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(ChangeKind::Rename)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Remove(RemoveKind::Folder)),
            Some(ChangeKind::Remove)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Access(notify::event::AccessKind::Any)),
            None
        );
    }

    #[test]
    fn change_event_serializes_lowercase() {
        let event = FileChangeEvent {
            kind: ChangeKind::Rename,
            path: "src/a.js".into(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({ "kind": "rename", "path": "src/a.js" })
        );
    }

    #[test]
    fn missing_root_fails_to_start() {
        let tmp = tempfile::tempdir().unwrap();
        let result = WorkspaceWatcher::start(tmp.path().join("absent"));
        assert!(matches!(result, Err(WorkspaceError::Watch { .. })));
    }

    #[tokio::test]
    async fn reports_nested_writes_relative_to_root() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("src")).unwrap();
        let (watcher, mut rx) = WorkspaceWatcher::start(tmp.path()).unwrap();

        std::fs::write(tmp.path().join("src/main.js"), "1").unwrap();

        let found = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = rx.recv().await {
                if event.path == "src/main.js" {
                    return Some(event);
                }
            }
            None
        })
        .await
        .expect("timed out waiting for watcher event");
        let event = found.expect("channel closed");
        assert!(matches!(event.kind, ChangeKind::Create | ChangeKind::Modify));

        watcher.stop();
    }
}
