//! Errors reported by remote adapters.

use std::io;
use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure of a remote operation.
///
/// The variants mirror what object stores can actually tell us. Anything
/// that might succeed on a second attempt is [`RemoteError::Transient`].
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The object or directory does not exist.
    #[error("Not found: {path}")]
    NotFound {
        /// Path that was looked up.
        path: String,
    },

    /// The destination already exists.
    #[error("Already exists: {path}")]
    AlreadyExists {
        /// Conflicting path.
        path: String,
    },

    /// The store refused access.
    #[error("Permission denied: {path}")]
    PermissionDenied {
        /// Path that was refused.
        path: String,
    },

    /// Directory removal on a directory that still has children.
    #[error("Directory not empty: {path}")]
    NotEmpty {
        /// Directory path.
        path: String,
    },

    /// An object operation was attempted on a directory.
    #[error("Is a directory: {path}")]
    IsDirectory {
        /// Offending path.
        path: String,
    },

    /// A directory operation was attempted on an object.
    #[error("Not a directory: {path}")]
    NotDirectory {
        /// Offending path.
        path: String,
    },

    /// Network or backend failure that may succeed if retried.
    #[error("Transient backend error on {path}: {message}")]
    Transient {
        /// Path being operated on.
        path: String,
        /// Description from the backend.
        message: String,
    },

    /// Any other I/O failure.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path being operated on.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl RemoteError {
    /// Builds a not-found error.
    pub fn not_found(path: &str) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }

    /// Builds a transient error.
    pub fn transient(path: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Classifies an [`io::Error`] raised while operating on `path`.
    pub fn from_io(path: &str, e: io::Error) -> Self {
        let path = path.to_string();
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty { path },
            io::ErrorKind::IsADirectory => Self::IsDirectory { path },
            io::ErrorKind::NotADirectory => Self::NotDirectory { path },
            io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::BrokenPipe => Self::Transient {
                path,
                message: e.to_string(),
            },
            _ => Self::Io { path, source: e },
        }
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns true if the remote confirmed the path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The path this error refers to.
    pub fn path(&self) -> &str {
        match self {
            Self::NotFound { path }
            | Self::AlreadyExists { path }
            | Self::PermissionDenied { path }
            | Self::NotEmpty { path }
            | Self::IsDirectory { path }
            | Self::NotDirectory { path }
            | Self::Transient { path, .. }
            | Self::Io { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_classification() {
        let e = RemoteError::from_io("a", io::Error::from(io::ErrorKind::NotFound));
        assert!(e.is_not_found());

        let e = RemoteError::from_io("a", io::Error::from(io::ErrorKind::TimedOut));
        assert!(e.is_transient());

        let e = RemoteError::from_io("a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(e, RemoteError::PermissionDenied { .. }));

        let e = RemoteError::from_io("a", io::Error::other("disk on fire"));
        assert!(matches!(e, RemoteError::Io { .. }));
        assert!(!e.is_transient());
    }

    #[test]
    fn test_path_accessor() {
        assert_eq!(RemoteError::not_found("x/y").path(), "x/y");
        assert_eq!(RemoteError::transient("z", "reset").path(), "z");
    }

    #[test]
    fn test_display_contains_path() {
        let e = RemoteError::transient("docs/a.txt", "connection reset");
        let msg = e.to_string();
        assert!(msg.contains("docs/a.txt"));
        assert!(msg.contains("connection reset"));
    }
}
