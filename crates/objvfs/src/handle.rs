//! The per-open-file handle state machine.
//!
//! A [`Handle`] is bound to one of five I/O variants at open time by
//! [`policy::resolve`](crate::policy::resolve). The variant decides what
//! each operation does:
//!
//! - **Direct read**: reads become remote byte-range reads. The remote
//!   stream is kept while reads stay sequential and reopened at the new
//!   offset otherwise.
//! - **Direct write**: writes stream into one remote upload that is
//!   committed on close. Only sequential writes are possible and no seek is
//!   allowed once a byte has been written.
//! - **Buffered read / write / read-write**: all I/O goes through a pinned
//!   [`CacheEntry`]. On close a dirty entry is uploaded in one piece.
//!
//! The state machine is `Open -> {Reading, Writing, Seeking}* -> Closing ->
//! Closed`; every operation on a closed handle is refused by the caller.

use crate::cache_store::{CacheEntry, Fingerprint};
use crate::error::{VfsError, VfsResult};
use crate::node::{FileMeta, FileNode};
use crate::policy::{HandleKind, OpenFlags, OpenPlan};
use crate::vfs::VfsInner;
use objvfs_remote::{RemoteEntry, RemoteError, RemoteWriter, path};
use std::fmt;
use std::io::{self, Read, SeekFrom, Write};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Where a handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Opened, no I/O yet.
    Open,
    /// Last operation was a read.
    Reading,
    /// Last operation was a write or truncate.
    Writing,
    /// Last operation was a seek.
    Seeking,
    /// Close in progress (write-back may be running).
    Closing,
    /// Closed; every further operation fails.
    Closed,
}

enum HandleIo {
    DirectRead {
        stream: Option<Box<dyn Read + Send>>,
        stream_pos: u64,
    },
    DirectWrite {
        writer: Option<Box<dyn RemoteWriter>>,
        written: u64,
    },
    BufferedRead {
        entry: Arc<CacheEntry>,
    },
    BufferedWrite {
        entry: Arc<CacheEntry>,
    },
    BufferedReadWrite {
        entry: Arc<CacheEntry>,
    },
}

impl HandleIo {
    fn entry(&self) -> Option<&Arc<CacheEntry>> {
        match self {
            HandleIo::BufferedRead { entry }
            | HandleIo::BufferedWrite { entry }
            | HandleIo::BufferedReadWrite { entry } => Some(entry),
            HandleIo::DirectRead { .. } | HandleIo::DirectWrite { .. } => None,
        }
    }
}

impl fmt::Debug for HandleIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleIo::DirectRead { stream, stream_pos } => f
                .debug_struct("DirectRead")
                .field("streaming", &stream.is_some())
                .field("stream_pos", stream_pos)
                .finish(),
            HandleIo::DirectWrite { writer, written } => f
                .debug_struct("DirectWrite")
                .field("open", &writer.is_some())
                .field("written", written)
                .finish(),
            HandleIo::BufferedRead { entry } => {
                f.debug_tuple("BufferedRead").field(&entry.path()).finish()
            }
            HandleIo::BufferedWrite { entry } => {
                f.debug_tuple("BufferedWrite").field(&entry.path()).finish()
            }
            HandleIo::BufferedReadWrite { entry } => f
                .debug_tuple("BufferedReadWrite")
                .field(&entry.path())
                .finish(),
        }
    }
}

/// One open-file session.
#[derive(Debug)]
pub struct Handle {
    node: Arc<FileNode>,
    flags: OpenFlags,
    plan: OpenPlan,
    offset: u64,
    state: HandleState,
    populated: bool,
    created: bool,
    io: HandleIo,
}

impl Handle {
    /// Builds the variant `plan` asks for. `remote` is the object as
    /// currently known, if it exists; `created` is set when this open
    /// created the file.
    pub(crate) fn open(
        inner: &VfsInner,
        node: Arc<FileNode>,
        flags: OpenFlags,
        plan: OpenPlan,
        remote: Option<&RemoteEntry>,
        created: bool,
    ) -> VfsResult<Self> {
        let file_path = node.path();
        let io = match plan.kind {
            HandleKind::DirectRead => HandleIo::DirectRead {
                stream: None,
                stream_pos: 0,
            },
            HandleKind::DirectWrite => {
                let writer = inner.remote.open_write(&file_path)?;
                // The upload replaces the object, so a dirty copy left by a
                // failed write-back must not be replayed over it later.
                inner.store.detach(&file_path);
                node.set_size(0);
                HandleIo::DirectWrite {
                    writer: Some(writer),
                    written: 0,
                }
            }
            HandleKind::BufferedRead
            | HandleKind::BufferedWrite
            | HandleKind::BufferedReadWrite => {
                let entry = inner
                    .store
                    .acquire(&file_path, remote.map(Fingerprint::from))?;
                if plan.truncate || created {
                    let resized = entry.lock().truncate(0);
                    if let Err(e) = resized {
                        inner.store.release(&entry, false);
                        return Err(e);
                    }
                    node.set_size(0);
                    node.mark_dirty();
                } else {
                    // A dirty entry from an earlier handle knows better than the remote.
                    let state = entry.lock();
                    if state.is_dirty() {
                        node.set_size(state.size());
                        node.mark_dirty();
                    }
                }
                match plan.kind {
                    HandleKind::BufferedRead => HandleIo::BufferedRead { entry },
                    HandleKind::BufferedWrite => HandleIo::BufferedWrite { entry },
                    _ => HandleIo::BufferedReadWrite { entry },
                }
            }
        };
        if plan.degraded {
            debug!(path = %file_path, kind = %plan.kind, ?flags, "open flags degraded for cache mode");
        }
        Ok(Self {
            node,
            flags,
            plan,
            offset: 0,
            state: HandleState::Open,
            populated: false,
            created,
            io,
        })
    }

    /// The variant this handle was opened as.
    pub fn kind(&self) -> HandleKind {
        self.plan.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Current offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Flags the handle was opened with.
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// The file this handle targets.
    pub fn node(&self) -> &Arc<FileNode> {
        &self.node
    }

    /// Whether this handle holds the node's writer slot.
    pub fn is_writer(&self) -> bool {
        self.plan.kind.can_write()
    }

    /// Whether the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.state == HandleState::Closed
    }

    fn size(&self) -> u64 {
        match &self.io {
            HandleIo::DirectWrite { written, .. } => *written,
            io => io
                .entry()
                .map_or_else(|| self.node.meta().size, |entry| entry.size()),
        }
    }

    /// Downloads the whole object once for eager plans.
    fn populate(&mut self, inner: &VfsInner) -> VfsResult<()> {
        if !self.plan.eager || self.populated {
            return Ok(());
        }
        if let Some(entry) = self.io.entry() {
            let mut state = entry.lock();
            if !state.is_complete() {
                debug!(path = %state.path(), size = state.size(), "downloading whole file");
            }
            state.fetch_all(inner.remote.as_ref(), &inner.stats)?;
        }
        self.populated = true;
        Ok(())
    }

    /// Reads into `buf` at `offset`. Returns the number of bytes read; a
    /// short count means end of file.
    pub(crate) fn read(
        &mut self,
        inner: &VfsInner,
        offset: u64,
        buf: &mut [u8],
    ) -> VfsResult<usize> {
        if !self.plan.kind.can_read() {
            return Err(if self.flags.access.reads() {
                VfsError::Unsupported("read on a handle degraded to write-only")
            } else {
                VfsError::WrongAccess {
                    path: self.node.path(),
                    access: "reading",
                }
            });
        }
        self.state = HandleState::Reading;
        self.populate(inner)?;
        let n = match &mut self.io {
            HandleIo::DirectRead { stream, stream_pos } => {
                let file_path = self.node.path();
                if stream.is_none() || *stream_pos != offset {
                    trace!(path = %file_path, offset, "opening remote read stream");
                    *stream = Some(inner.remote.open_read(&file_path, offset)?);
                    *stream_pos = offset;
                }
                let mut total = 0;
                while total < buf.len() {
                    let Some(reader) = stream.as_mut() else { break };
                    match reader.read(&mut buf[total..]) {
                        Ok(0) => break,
                        Ok(n) => total += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            *stream = None;
                            return Err(RemoteError::from_io(&file_path, e).into());
                        }
                    }
                }
                *stream_pos += total as u64;
                inner.stats.record_download(total as u64);
                total
            }
            HandleIo::DirectWrite { .. } => {
                return Err(VfsError::Unsupported("read on a direct-write handle"));
            }
            io => {
                let Some(entry) = io.entry() else {
                    return Ok(0);
                };
                entry
                    .lock()
                    .read_at(inner.remote.as_ref(), &inner.stats, offset, buf)?
            }
        };
        self.offset = offset + n as u64;
        inner.stats.record_read(n as u64);
        Ok(n)
    }

    /// Writes `data` at `offset` (at end of file for append plans).
    pub(crate) fn write(&mut self, inner: &VfsInner, offset: u64, data: &[u8]) -> VfsResult<usize> {
        if !self.plan.kind.can_write() {
            return Err(VfsError::WrongAccess {
                path: self.node.path(),
                access: "writing",
            });
        }
        self.state = HandleState::Writing;
        self.populate(inner)?;
        let end = match &mut self.io {
            HandleIo::DirectWrite { writer, written } => {
                if offset != *written {
                    return Err(VfsError::Unsupported(
                        "non-sequential write on a direct-write handle",
                    ));
                }
                let Some(sink) = writer.as_mut() else {
                    return Err(VfsError::Unsupported("write after upload finished"));
                };
                sink.write_all(data)
                    .map_err(|e| RemoteError::from_io(&self.node.path(), e))?;
                *written += data.len() as u64;
                self.node.set_size(*written);
                *written
            }
            io => {
                let Some(entry) = io.entry() else {
                    return Err(VfsError::Unsupported("write on a read-only handle"));
                };
                let mut state = entry.lock();
                let at = if self.plan.append { state.size() } else { offset };
                state.write_at(at, data)?;
                self.node.set_size(state.size());
                self.node.mark_dirty();
                at + data.len() as u64
            }
        };
        self.offset = end;
        inner.stats.record_write(data.len() as u64);
        Ok(data.len())
    }

    /// Moves the offset. Direct writers refuse once anything was written.
    pub(crate) fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
            SeekFrom::End(delta) => self.size().checked_add_signed(delta),
        }
        .ok_or_else(|| VfsError::InvalidArgument(format!("seek out of range: {pos:?}")))?;

        if let HandleIo::DirectWrite { written, .. } = &self.io
            && *written > 0
            && target != self.offset
        {
            return Err(VfsError::Unsupported(
                "seek on a direct-write handle after writing",
            ));
        }
        self.state = HandleState::Seeking;
        self.offset = target;
        Ok(target)
    }

    /// Sets the file length.
    pub(crate) fn truncate(&mut self, size: u64) -> VfsResult<()> {
        match &mut self.io {
            HandleIo::DirectWrite { written, .. } => {
                if size != *written {
                    return Err(VfsError::Unsupported(
                        "truncate on a direct-write handle",
                    ));
                }
            }
            HandleIo::BufferedWrite { entry } | HandleIo::BufferedReadWrite { entry } => {
                let mut state = entry.lock();
                state.truncate(size)?;
                self.node.set_size(size);
                self.node.mark_dirty();
            }
            HandleIo::DirectRead { .. } | HandleIo::BufferedRead { .. } => {
                return Err(VfsError::WrongAccess {
                    path: self.node.path(),
                    access: "writing",
                });
            }
        }
        self.state = HandleState::Writing;
        Ok(())
    }

    /// Finishes the handle: commits a direct upload or writes back a dirty
    /// cache entry, then unpins it.
    pub(crate) fn close(&mut self, inner: &VfsInner) -> VfsResult<()> {
        self.state = HandleState::Closing;
        let file_path = self.node.path();
        let result = match &mut self.io {
            HandleIo::DirectRead { stream, .. } => {
                *stream = None;
                Ok(())
            }
            HandleIo::DirectWrite { writer, written } => match writer.take() {
                Some(sink) if self.node.is_deleted() => {
                    sink.abort();
                    Ok(())
                }
                Some(sink) => {
                    let started = std::time::Instant::now();
                    match sink.commit() {
                        Ok(committed) => {
                            inner.stats.record_upload(*written, started.elapsed());
                            publish(inner, &file_path, committed);
                            Ok(())
                        }
                        Err(e) => {
                            error!(path = %file_path, error = %e, "direct upload failed");
                            if self.created {
                                forget_created(inner, &file_path);
                            }
                            Err(e.into())
                        }
                    }
                }
                None => Ok(()),
            },
            io => match io.entry() {
                Some(entry) => {
                    let entry = Arc::clone(entry);
                    self.close_buffered(inner, &file_path, &entry)
                }
                None => Ok(()),
            },
        };
        self.state = HandleState::Closed;
        result
    }

    fn close_buffered(
        &self,
        inner: &VfsInner,
        file_path: &str,
        entry: &Arc<CacheEntry>,
    ) -> VfsResult<()> {
        let mut state = entry.lock();
        let outcome = if state.is_dirty() && !state.is_detached() && !self.node.is_deleted() {
            Some(state.upload(inner.remote.as_ref(), &inner.stats))
        } else {
            None
        };
        drop(state);
        inner
            .store
            .release(entry, inner.options.cache_mode.retains_content());

        match outcome {
            Some(Ok(committed)) => {
                publish(inner, file_path, committed);
                Ok(())
            }
            Some(Err(e)) => {
                inner.stats.record_write_back_failure();
                error!(path = file_path, error = %e, "write-back failed, keeping dirty copy");
                Err(VfsError::WriteBackFailed {
                    path: file_path.to_string(),
                    source: Box::new(e),
                })
            }
            None => Ok(()),
        }
    }

    /// Tears the handle down without uploading anything. Direct uploads are
    /// aborted; dirty cache entries stay on disk for the next startup.
    pub(crate) fn abandon(&mut self, inner: &VfsInner) {
        match &mut self.io {
            HandleIo::DirectRead { stream, .. } => *stream = None,
            HandleIo::DirectWrite { writer, .. } => {
                if let Some(sink) = writer.take() {
                    let file_path = self.node.path();
                    warn!(path = %file_path, "aborting in-flight upload");
                    sink.abort();
                    if self.created && !self.node.is_deleted() {
                        forget_created(inner, &file_path);
                    }
                }
            }
            io => {
                if let Some(entry) = io.entry() {
                    inner.store.release(entry, true);
                }
            }
        }
        self.state = HandleState::Closed;
    }
}

/// Drops the listing entry of a file whose creating upload never landed.
fn forget_created(inner: &VfsInner, file_path: &str) {
    let (dir, name) = path::split(file_path);
    inner.dirs.remove_entry(dir, name);
    inner.dirs.invalidate(dir);
}

/// Makes a committed upload visible to the open node and the directory tree.
pub(crate) fn publish(inner: &VfsInner, file_path: &str, committed: RemoteEntry) {
    if let Some(node) = inner.nodes.get(file_path) {
        node.set_meta(FileMeta::from(&committed));
    }
    let (dir, name) = path::split(file_path);
    inner.dirs.add_entry(
        dir,
        RemoteEntry {
            name: name.to_string(),
            ..committed
        },
    );
    inner.dirs.invalidate(dir);
}
