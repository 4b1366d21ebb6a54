//! Remote object store adapter interface for the objvfs cache engine.
//!
//! Object stores only offer whole-object GET/PUT, listings and a handful of
//! namespace operations. This crate captures that capability set as the
//! [`Remote`] trait, which the cache engine in `objvfs` consumes without
//! knowing which store sits behind it.
//!
//! # Components
//!
//! - [`Remote`] - list, stat, ranged read, whole-object write, remove, mkdir,
//!   rmdir and rename
//! - [`RemoteWriter`] - an upload stream that only becomes visible on
//!   [`RemoteWriter::commit`]
//! - [`RemoteError`] - fallible outcomes, classified so callers can tell
//!   "not found" from "retry later"
//! - [`path`] - helpers for the slash-separated, root-relative paths used
//!   everywhere in the engine
//!
//! # Adapters
//!
//! - [`LocalDirRemote`] - a directory on local disk standing in for a bucket;
//!   uploads are staged in a temporary file and renamed into place
//! - [`MemoryRemote`] - an in-memory store with call counters and fault
//!   injection, used by the test suites
//!
//! # Example
//!
//! ```
//! use objvfs_remote::{MemoryRemote, Remote};
//! use std::io::{Read, Write};
//!
//! let remote = MemoryRemote::new();
//! let mut writer = remote.open_write("docs/hello.txt")?;
//! writer.write_all(b"hello")?;
//! writer.commit()?;
//!
//! let mut content = String::new();
//! remote.open_read("docs/hello.txt", 1)?.read_to_string(&mut content)?;
//! assert_eq!(content, "ello");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod local;
mod memory;
pub mod path;

pub use error::{RemoteError, RemoteResult};
pub use local::LocalDirRemote;
pub use memory::{MemoryRemote, RemoteCounters};

use std::fmt;
use std::io::{Read, Write};
use std::time::SystemTime;

/// One entry of a remote listing, or the result of a stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Final path segment (empty for the root).
    pub name: String,
    /// Whether this entry is a directory (or a common prefix).
    pub is_dir: bool,
    /// Object size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time as reported by the store.
    pub mod_time: SystemTime,
}

impl RemoteEntry {
    /// Creates a file entry.
    pub fn file(name: impl Into<String>, size: u64, mod_time: SystemTime) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size,
            mod_time,
        }
    }

    /// Creates a directory entry.
    pub fn dir(name: impl Into<String>, mod_time: SystemTime) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: 0,
            mod_time,
        }
    }
}

/// An upload stream for one whole object.
///
/// Bytes written are not visible remotely until [`commit`](Self::commit)
/// returns. Dropping or [`abort`](Self::abort)ing the writer leaves the
/// previous object (if any) untouched.
pub trait RemoteWriter: Write + Send {
    /// Finishes the upload and returns the stored object's metadata.
    fn commit(self: Box<Self>) -> RemoteResult<RemoteEntry>;

    /// Abandons the upload.
    fn abort(self: Box<Self>) {}
}

/// Capability interface over an object store.
///
/// Paths are root-relative and slash-separated (see [`path::normalize`]);
/// the empty string is the root. Every call may block on network I/O and
/// every call is fallible.
pub trait Remote: Send + Sync + fmt::Debug {
    /// A short human-readable name for logs.
    fn name(&self) -> &str;

    /// Lists the immediate children of the directory at `path`.
    fn list(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>>;

    /// Returns metadata for a single object or directory.
    fn stat(&self, path: &str) -> RemoteResult<RemoteEntry>;

    /// Opens a read stream positioned at `offset`.
    ///
    /// Reading past the end yields EOF rather than an error.
    fn open_read(&self, path: &str, offset: u64) -> RemoteResult<Box<dyn Read + Send>>;

    /// Opens a whole-object upload stream, replacing any existing object.
    fn open_write(&self, path: &str) -> RemoteResult<Box<dyn RemoteWriter>>;

    /// Removes a single object.
    fn remove(&self, path: &str) -> RemoteResult<()>;

    /// Creates a directory.
    fn mkdir(&self, path: &str) -> RemoteResult<()>;

    /// Removes an empty directory.
    fn rmdir(&self, path: &str) -> RemoteResult<()>;

    /// Moves an object or a directory tree.
    fn rename(&self, src: &str, dst: &str) -> RemoteResult<()>;
}
