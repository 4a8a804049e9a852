use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, WorkspaceError};

/// Snapshot of a directory: child name → `None` for a file, `Some` for a
/// subdirectory. Serializes as `{"a.txt": null, "src": {"main.js": null}}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree(BTreeMap<String, Option<FileTree>>);

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `dir` depth-first. Symlinks are listed as leaves and never
    /// followed; entries whose name is in `exclude` are skipped.
    pub fn build(dir: &Path, exclude: &[String]) -> Result<Self> {
        let mut tree = Self::new();
        let entries = fs::read_dir(dir).map_err(|e| WorkspaceError::io(dir.display(), e))?;

        for entry in entries {
            let entry = entry.map_err(|e| WorkspaceError::io(dir.display(), e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if exclude.iter().any(|skip| *skip == name) {
                continue;
            }

            let file_type = entry
                .file_type()
                .map_err(|e| WorkspaceError::io(entry.path().display(), e))?;
            if file_type.is_dir() {
                tree.insert_dir(name, Self::build(&entry.path(), exclude)?);
            } else {
                tree.insert_file(name);
            }
        }

        Ok(tree)
    }

    pub fn insert_file(&mut self, name: impl Into<String>) {
        self.0.insert(name.into(), None);
    }

    pub fn insert_dir(&mut self, name: impl Into<String>, subtree: FileTree) {
        self.0.insert(name.into(), Some(subtree));
    }

    pub fn get(&self, name: &str) -> Option<Option<&FileTree>> {
        self.0.get(name).map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Leaves in the whole tree
    pub fn file_count(&self) -> usize {
        self.0
            .values()
            .map(|child| child.as_ref().map_or(1, FileTree::file_count))
            .sum()
    }

    /// Subdirectories in the whole tree, not counting the root
    pub fn dir_count(&self) -> usize {
        self.0
            .values()
            .flatten()
            .map(|child| 1 + child.dir_count())
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&FileTree>)> {
        self.0.iter().map(|(name, child)| (name.as_str(), child.as_ref()))
    }
}
