use std::fmt::Display;
use std::io;

pub type Result<T> = std::result::Result<T, WorkspaceError>;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("path escapes the workspace: {0}")]
    PathEscape(String),

    #[error("is a directory: {0}")]
    IsDirectory(String),

    #[error("not a UTF-8 text file: {0}")]
    NotText(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to watch {path}: {reason}")]
    Watch { path: String, reason: String },
}

impl WorkspaceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::PathEscape(_) => "path_escape",
            Self::IsDirectory(_) => "is_directory",
            Self::NotText(_) => "not_text",
            Self::Io { .. } => "io_error",
            Self::Watch { .. } => "watch_failed",
        }
    }

    pub(crate) fn io(path: impl Display, source: io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Like [`WorkspaceError::io`], but absence becomes `NotFound`.
    pub(crate) fn from_read(path: impl Display, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::InvalidData => Self::NotText(path.to_string()),
            _ => Self::io(path, source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_errors_are_classified() {
        let missing = WorkspaceError::from_read("a.txt", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(missing, WorkspaceError::NotFound(ref p) if p == "a.txt"));
        assert_eq!(missing.error_code(), "not_found");

        let denied =
            WorkspaceError::from_read("b.txt", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.error_code(), "io_error");
        assert!(denied.to_string().starts_with("I/O error on b.txt"));

        let binary = WorkspaceError::from_read("c.bin", io::Error::from(io::ErrorKind::InvalidData));
        assert_eq!(binary.error_code(), "not_text");
    }
}
