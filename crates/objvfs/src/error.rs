//! Engine errors and their POSIX mapping.
//!
//! Every [`VfsError`] classifies into an [`ErrorKind`], which in turn maps to
//! the errno a mount front-end should hand back to the kernel.

use objvfs_remote::RemoteError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// Semantic category of an engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Path absent remotely and not pending locally.
    NotFound,
    /// Target already exists.
    AlreadyExists,
    /// Access refused by the remote.
    PermissionDenied,
    /// The operation cannot be honored by this handle in this cache mode.
    Unsupported,
    /// Network or backend failure; retrying may succeed.
    Transient,
    /// Upload after buffered writes failed; the data is kept for retry.
    WriteBackFailed,
    /// Directory still has children.
    NotEmpty,
    /// File operation on a directory.
    IsDirectory,
    /// Directory operation on a file (or traversal through one).
    NotDirectory,
    /// Another writer holds the file.
    Busy,
    /// Unknown handle, or handle not open for this kind of access.
    BadHandle,
    /// Local or unclassified I/O failure.
    Io,
    /// Invalid argument or configuration.
    InvalidArgument,
    /// The engine has been shut down.
    ShutDown,
}

impl ErrorKind {
    /// Converts to a libc error code.
    pub fn to_errno(self) -> i32 {
        match self {
            ErrorKind::NotFound => libc::ENOENT,
            ErrorKind::AlreadyExists => libc::EEXIST,
            ErrorKind::PermissionDenied => libc::EACCES,
            ErrorKind::Unsupported => libc::ENOTSUP,
            ErrorKind::Transient | ErrorKind::WriteBackFailed | ErrorKind::Io => libc::EIO,
            ErrorKind::NotEmpty => libc::ENOTEMPTY,
            ErrorKind::IsDirectory => libc::EISDIR,
            ErrorKind::NotDirectory => libc::ENOTDIR,
            ErrorKind::Busy => libc::EBUSY,
            ErrorKind::BadHandle => libc::EBADF,
            ErrorKind::InvalidArgument => libc::EINVAL,
            ErrorKind::ShutDown => libc::ESHUTDOWN,
        }
    }

    /// Short name for logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Unsupported => "unsupported operation",
            ErrorKind::Transient => "transient backend error",
            ErrorKind::WriteBackFailed => "write-back failed",
            ErrorKind::NotEmpty => "directory not empty",
            ErrorKind::IsDirectory => "is a directory",
            ErrorKind::NotDirectory => "not a directory",
            ErrorKind::Busy => "busy",
            ErrorKind::BadHandle => "bad file handle",
            ErrorKind::Io => "I/O error",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::ShutDown => "shut down",
        }
    }
}

impl From<&RemoteError> for ErrorKind {
    fn from(e: &RemoteError) -> Self {
        match e {
            RemoteError::NotFound { .. } => ErrorKind::NotFound,
            RemoteError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            RemoteError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            RemoteError::NotEmpty { .. } => ErrorKind::NotEmpty,
            RemoteError::IsDirectory { .. } => ErrorKind::IsDirectory,
            RemoteError::NotDirectory { .. } => ErrorKind::NotDirectory,
            RemoteError::Transient { .. } => ErrorKind::Transient,
            RemoteError::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Errors raised by the engine.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Failure reported by the remote.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Path does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A path segment that must be a directory is a file.
    #[error("Not a directory: {0}")]
    NotDirectory(String),

    /// File operation on a directory.
    #[error("Is a directory: {0}")]
    IsDirectory(String),

    /// Directory removal with children present.
    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    /// Operation the handle's variant cannot perform.
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// Another handle already writes this file.
    #[error("File is busy: {0}")]
    Busy(String),

    /// Unknown file handle.
    #[error("Invalid file handle: {0}")]
    InvalidHandle(u64),

    /// Handle was not opened for the requested access.
    #[error("Handle not open for {access}: {path}")]
    WrongAccess {
        /// File path.
        path: String,
        /// "reading" or "writing".
        access: &'static str,
    },

    /// Uploading buffered content failed; the cache entry stays dirty.
    #[error("Write-back of {path} failed: {source}")]
    WriteBackFailed {
        /// File path.
        path: String,
        /// Cause of the failure.
        #[source]
        source: Box<VfsError>,
    },

    /// Local cache storage failure.
    #[error("Cache I/O error on {}: {source}", path.display())]
    CacheIo {
        /// Local path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Other I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Bad argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bad configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Operation attempted after shutdown.
    #[error("Filesystem has been shut down")]
    ShutDown,
}

impl VfsError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::Remote(e) => ErrorKind::from(e),
            VfsError::NotFound(_) => ErrorKind::NotFound,
            VfsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            VfsError::NotDirectory(_) => ErrorKind::NotDirectory,
            VfsError::IsDirectory(_) => ErrorKind::IsDirectory,
            VfsError::NotEmpty(_) => ErrorKind::NotEmpty,
            VfsError::Unsupported(_) => ErrorKind::Unsupported,
            VfsError::Busy(_) => ErrorKind::Busy,
            VfsError::InvalidHandle(_) | VfsError::WrongAccess { .. } => ErrorKind::BadHandle,
            VfsError::WriteBackFailed { .. } => ErrorKind::WriteBackFailed,
            VfsError::CacheIo { .. } | VfsError::Io(_) => ErrorKind::Io,
            VfsError::InvalidArgument(_) | VfsError::Config(_) => ErrorKind::InvalidArgument,
            VfsError::ShutDown => ErrorKind::ShutDown,
        }
    }

    /// Converts this error to a libc error code.
    pub fn to_errno(&self) -> i32 {
        self.kind().to_errno()
    }

    /// Returns true if the path was confirmed absent.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Wraps a local file error with the cache path it concerns.
    pub(crate) fn cache_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        VfsError::CacheIo {
            path: path.into(),
            source,
        }
    }
}
