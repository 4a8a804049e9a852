use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, WorkspaceError};
use crate::path::WorkspaceRoot;
use crate::tree::FileTree;

/// Filesystem accessor for one workspace directory.
///
/// All methods are blocking; async callers should run them on a blocking
/// thread. The store never notifies anyone about writes, that is the
/// watcher's job.
#[derive(Clone, Debug)]
pub struct WorkspaceStore {
    root: WorkspaceRoot,
    exclude: Arc<[String]>,
}

impl WorkspaceStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            root: WorkspaceRoot::new(root)?,
            exclude: Arc::from(Vec::new()),
        })
    }

    /// Names to leave out of tree listings
    pub fn with_exclude(mut self, names: Vec<String>) -> Self {
        self.exclude = Arc::from(names);
        self
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn workspace_root(&self) -> &WorkspaceRoot {
        &self.root
    }

    /// Fresh snapshot of the whole workspace
    pub fn list_tree(&self) -> Result<FileTree> {
        FileTree::build(self.root.path(), &self.exclude)
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        let target = self.root.resolve_existing(path)?;
        if target.is_dir() {
            return Err(WorkspaceError::IsDirectory(path.to_string()));
        }
        fs::read_to_string(&target).map_err(|e| WorkspaceError::from_read(path, e))
    }

    /// Create or overwrite a file. Missing parent directories are an error.
    pub fn write_file(&self, path: &str, content: impl AsRef<[u8]>) -> Result<()> {
        let target = self.root.resolve_for_write(path)?;
        let content = content.as_ref();
        fs::write(&target, content).map_err(|e| WorkspaceError::io(path, e))?;
        debug!(path = %path, bytes = content.len(), "Wrote workspace file");
        Ok(())
    }
}
