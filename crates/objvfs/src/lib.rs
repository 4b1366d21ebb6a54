//! Virtual filesystem cache engine over a remote object store.
//!
//! Object stores offer whole-object GET/PUT, flat listings and high
//! per-call latency. Filesystem callers expect random-access reads and
//! writes, seek, truncate, append and cheap metadata. This crate sits in
//! between: a mount front-end calls [`Vfs`] and the engine decides, per
//! open file, whether to talk to the [`Remote`](objvfs_remote::Remote)
//! directly or through a local on-disk copy.
//!
//! # Components
//!
//! - [`Vfs`] - the front-end facade: `open`, `read`, `write`, `truncate`,
//!   `close`, `readdir`, `mkdir`, `remove`, `rename`, `stat`
//! - [`DirTree`] - directory listings cached with a TTL, local mutations
//!   layered on top, flushable as a whole
//! - [`CacheStore`] - sparse local copies of file content, dirty tracking
//!   and crash-safe sidecars
//! - [`policy`] - the cache-mode decision table choosing one of five
//!   [`HandleKind`]s for every open
//! - [`Handle`] - the per-open state machine for those five variants
//! - reconciler - a background thread writing back leftover dirty entries
//!   and purging clean ones
//! - [`FlushTrigger`] - `SIGHUP` as the directory cache flush signal
//!
//! # Cache modes
//!
//! [`CacheMode`] is ordered `Off < Minimal < Writes < Full`; each mode
//! buffers more on disk than the previous one. See [`policy`] for the full
//! table and the documented degradations (no read+write under `off`, no
//! seek after writing on direct writers, `O_APPEND`/`O_TRUNC` ignored where
//! a direct upload cannot honor them).
//!
//! # Example
//!
//! ```
//! use objvfs::{CacheMode, OpenFlags, Vfs, VfsOptions};
//! use objvfs_remote::MemoryRemote;
//! use std::sync::Arc;
//!
//! let cache = tempfile::tempdir()?;
//! let remote = MemoryRemote::new();
//! remote.insert_object("docs/readme.txt", b"hello world".to_vec());
//!
//! let vfs = Vfs::new(
//!     Arc::new(remote),
//!     VfsOptions::default().cache_mode(CacheMode::Full).cache_dir(cache.path()),
//! )?;
//!
//! let names: Vec<_> = vfs.readdir("/docs")?.into_iter().map(|e| e.name).collect();
//! assert_eq!(names, ["readme.txt"]);
//!
//! let fh = vfs.open("/docs/readme.txt", OpenFlags::read_only())?;
//! let mut buf = [0u8; 5];
//! vfs.read(fh, 6, &mut buf)?;
//! assert_eq!(&buf, b"world");
//! vfs.close(fh)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache_store;
pub mod config;
pub mod dir_cache;
pub mod error;
pub mod handle;
pub mod handle_table;
pub mod node;
pub mod policy;
pub mod ranges;
mod reconciler;
pub mod signal;
pub mod stats;
pub mod testing;
mod vfs;

pub use cache_store::{CacheEntry, CacheStore, Fingerprint};
pub use config::{CacheMode, ParseCacheModeError, VfsOptions, default_cache_dir};
pub use dir_cache::DirTree;
pub use error::{ErrorKind, VfsError, VfsResult};
pub use handle::{Handle, HandleState};
pub use handle_table::HandleTable;
pub use node::{FileMeta, FileNode, NodeTable};
pub use policy::{AccessMode, HandleKind, OpenFlags, OpenPlan};
pub use ranges::RangeSet;
pub use reconciler::CycleReport;
pub use signal::FlushTrigger;
pub use stats::{VfsStats, VfsStatsSnapshot};
pub use vfs::{DirEntry, FileAttr, FileKind, FlushHandle, ShutdownMode, Vfs};
