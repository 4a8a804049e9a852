//! Resolution of client-supplied paths against the workspace root.
//!
//! Every path a client sends goes through [`WorkspaceRoot`] before the
//! filesystem is touched. The check is done twice: lexically (no `..` above
//! the root, no absolute prefixes) and on the canonical path (no symlink that
//! leads outside).

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, WorkspaceError};

/// A canonicalized workspace root directory
#[derive(Clone, Debug)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    /// Canonicalize `root`. It must exist and be a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let display = root.as_ref().display().to_string();
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|e| WorkspaceError::from_read(&display, e))?;
        if !root.is_dir() {
            return Err(WorkspaceError::io(
                &display,
                io::Error::other("workspace root is not a directory"),
            ));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a path that must already exist.
    pub fn resolve_existing(&self, requested: &str) -> Result<PathBuf> {
        let joined = self.root.join(normalize(requested)?);
        let canonical = joined
            .canonicalize()
            .map_err(|e| WorkspaceError::from_read(requested, e))?;
        self.ensure_inside(&canonical, requested)?;
        Ok(canonical)
    }

    /// Resolve a file to be created or overwritten. The parent directory must
    /// already exist; it is never created here.
    pub fn resolve_for_write(&self, requested: &str) -> Result<PathBuf> {
        let relative = normalize(requested)?;
        let name = relative
            .file_name()
            .ok_or_else(|| WorkspaceError::IsDirectory(requested.to_string()))?
            .to_owned();

        let parent = self.root.join(relative.parent().unwrap_or(Path::new("")));
        let parent = parent
            .canonicalize()
            .map_err(|e| WorkspaceError::io(requested, e))?;
        self.ensure_inside(&parent, requested)?;

        let target = parent.join(name);
        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.file_type().is_symlink() => {
                // A dangling link cannot be checked, so it is refused
                let resolved = target
                    .canonicalize()
                    .map_err(|_| WorkspaceError::PathEscape(requested.to_string()))?;
                self.ensure_inside(&resolved, requested)?;
                if resolved.is_dir() {
                    return Err(WorkspaceError::IsDirectory(requested.to_string()));
                }
                Ok(resolved)
            }
            Ok(meta) if meta.is_dir() => Err(WorkspaceError::IsDirectory(requested.to_string())),
            _ => Ok(target),
        }
    }

    /// Express an absolute path under the root as a `/`-separated relative
    /// path. Returns `None` for the root itself and for paths outside it.
    pub fn relativize(&self, absolute: &Path) -> Option<String> {
        let relative = absolute.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    fn ensure_inside(&self, canonical: &Path, requested: &str) -> Result<()> {
        if canonical.starts_with(&self.root) {
            Ok(())
        } else {
            Err(WorkspaceError::PathEscape(requested.to_string()))
        }
    }
}

/// Turn a client path into a relative path with no `.`/`..` components.
///
/// Leading slashes are accepted (clients address files as `/src/main.js`).
/// `..` that would climb above the root is a `PathEscape`.
pub fn normalize(requested: &str) -> Result<PathBuf> {
    let trimmed = requested.trim_start_matches('/');
    let mut out = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return Err(WorkspaceError::PathEscape(requested.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(WorkspaceError::PathEscape(requested.to_string()));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_leading_slash_and_dots() {
        assert_eq!(normalize("/a.txt").unwrap(), PathBuf::from("a.txt"));
        assert_eq!(normalize("src/./main.js").unwrap(), PathBuf::from("src/main.js"));
        assert_eq!(normalize("src/lib/../main.js").unwrap(), PathBuf::from("src/main.js"));
        assert_eq!(normalize("").unwrap(), PathBuf::new());
    }

    #[test]
    fn normalize_rejects_climbing_out() {
        for path in ["..", "../etc/passwd", "/src/../../secret", "a/../../b"] {
            assert!(
                matches!(normalize(path), Err(WorkspaceError::PathEscape(_))),
                "{path} should escape"
            );
        }
    }

    #[test]
    fn resolve_existing_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "x").unwrap();
        let root = WorkspaceRoot::new(tmp.path()).unwrap();

        let resolved = root.resolve_existing("/a.txt").unwrap();
        assert_eq!(resolved, root.path().join("a.txt"));

        assert!(matches!(
            root.resolve_existing("/missing.txt"),
            Err(WorkspaceError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_outside_root_is_an_escape() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret"), "s").unwrap();
        let tmp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), tmp.path().join("link")).unwrap();
        let root = WorkspaceRoot::new(tmp.path()).unwrap();

        assert!(matches!(
            root.resolve_existing("link"),
            Err(WorkspaceError::PathEscape(_))
        ));
        assert!(matches!(
            root.resolve_for_write("link"),
            Err(WorkspaceError::PathEscape(_))
        ));
    }

    #[test]
    fn write_target_needs_existing_parent() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("src")).unwrap();
        let root = WorkspaceRoot::new(tmp.path()).unwrap();

        assert_eq!(
            root.resolve_for_write("/src/new.js").unwrap(),
            root.path().join("src").join("new.js")
        );
        assert!(matches!(
            root.resolve_for_write("/nope/new.js"),
            Err(WorkspaceError::Io { .. })
        ));
        assert!(matches!(
            root.resolve_for_write("/src"),
            Err(WorkspaceError::IsDirectory(_))
        ));
        assert!(matches!(
            root.resolve_for_write("/"),
            Err(WorkspaceError::IsDirectory(_))
        ));
    }

    #[test]
    fn relativize_uses_forward_slashes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = WorkspaceRoot::new(tmp.path()).unwrap();
        let nested = root.path().join("src").join("main.js");
        assert_eq!(root.relativize(&nested).as_deref(), Some("src/main.js"));
        assert_eq!(root.relativize(root.path()), None);
        assert_eq!(root.relativize(Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn missing_root_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            WorkspaceRoot::new(tmp.path().join("absent")),
            Err(WorkspaceError::NotFound(_))
        ));
    }
}
