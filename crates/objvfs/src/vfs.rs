//! The engine facade called by a mount front-end.
//!
//! [`Vfs`] ties the directory tree, node table, handle table, cache store
//! and reconciler together behind the operations a filesystem front-end
//! needs: `open`/`read`/`write`/`truncate`/`close` on handles, and
//! `readdir`/`mkdir`/`remove`/`rename`/`stat` on paths.
//!
//! Paths may be given with or without a leading `/`. Every mutating path
//! operation updates the directory tree before returning.

use crate::cache_store::CacheStore;
use crate::config::VfsOptions;
use crate::dir_cache::DirTree;
use crate::error::{VfsError, VfsResult};
use crate::handle::{self, Handle};
use crate::handle_table::HandleTable;
use crate::node::{FileMeta, NodeTable};
use crate::policy::{self, HandleKind, OpenFlags};
use crate::reconciler::{self, CycleReport, Reconciler};
use crate::signal::FlushTrigger;
use crate::stats::VfsStats;
use objvfs_remote::{Remote, RemoteEntry, path};
use parking_lot::Mutex;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;
use tracing::{debug, info, instrument, trace, warn};

/// Whether an entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

/// Attributes reported by `stat` and `readdir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    /// File or directory.
    pub kind: FileKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub mod_time: SystemTime,
    /// Permission bits.
    pub perm: u32,
    /// Owner.
    pub uid: u32,
    /// Group.
    pub gid: u32,
}

/// One `readdir` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Child name.
    pub name: String,
    /// Child attributes.
    pub attr: FileAttr,
}

/// How [`Vfs::shutdown`] treats open handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Close every handle normally, waiting for write-backs.
    Graceful,
    /// Drop every handle without uploading; dirty content stays on disk.
    Abandon,
}

/// Shared engine state.
#[derive(Debug)]
pub(crate) struct VfsInner {
    pub(crate) remote: Arc<dyn Remote>,
    pub(crate) options: VfsOptions,
    pub(crate) dirs: DirTree,
    pub(crate) store: CacheStore,
    pub(crate) nodes: NodeTable,
    pub(crate) handles: HandleTable<Arc<Mutex<Handle>>>,
    pub(crate) stats: Arc<VfsStats>,
    shut_down: AtomicBool,
    reconciler: Mutex<Option<Reconciler>>,
}

/// A virtual filesystem over a [`Remote`].
///
/// ```
/// use objvfs::{CacheMode, OpenFlags, Vfs, VfsOptions};
/// use objvfs_remote::MemoryRemote;
/// use std::sync::Arc;
///
/// let cache = tempfile::tempdir()?;
/// let remote = MemoryRemote::new();
/// let options = VfsOptions::default()
///     .cache_mode(CacheMode::Writes)
///     .cache_dir(cache.path());
/// let vfs = Vfs::new(Arc::new(remote.clone()), options)?;
///
/// let fh = vfs.open("/notes.txt", OpenFlags::write_only().create())?;
/// vfs.write(fh, 0, b"hello")?;
/// vfs.close(fh)?;
///
/// assert_eq!(remote.object("notes.txt").as_deref(), Some(&b"hello"[..]));
/// assert_eq!(vfs.stat("/notes.txt")?.size, 5);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Vfs {
    inner: Arc<VfsInner>,
}

fn cache_root(options: &VfsOptions, remote: &dyn Remote) -> PathBuf {
    let name: String = remote
        .name()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    options.cache_dir.join(name)
}

impl Vfs {
    /// Starts an engine over `remote` with a snapshot of `options`.
    ///
    /// Opens (or creates) the cache area, re-adopts dirty entries left by a
    /// previous run and starts the reconciler.
    pub fn new(remote: Arc<dyn Remote>, options: VfsOptions) -> VfsResult<Self> {
        options.validate()?;
        let stats = Arc::new(VfsStats::new());
        let root = cache_root(&options, remote.as_ref());
        let store = CacheStore::open(&root, Arc::clone(&stats))?;
        let dirs = DirTree::new(
            Arc::clone(&remote),
            options.dir_cache_time,
            Arc::clone(&stats),
        );
        let interval = options.cache_poll_interval;
        info!(
            remote = remote.name(),
            mode = %options.cache_mode,
            cache = %root.display(),
            "vfs started"
        );
        let inner = Arc::new(VfsInner {
            remote,
            options,
            dirs,
            store,
            nodes: NodeTable::new(),
            handles: HandleTable::new(),
            stats,
            shut_down: AtomicBool::new(false),
            reconciler: Mutex::new(None),
        });
        let reconciler = Reconciler::spawn(Arc::downgrade(&inner), interval)?;
        *inner.reconciler.lock() = Some(reconciler);
        Ok(Self { inner })
    }

    fn check_live(&self) -> VfsResult<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(VfsError::ShutDown);
        }
        Ok(())
    }

    fn handle(&self, fh: u64) -> VfsResult<Arc<Mutex<Handle>>> {
        self.check_live()?;
        self.inner
            .handles
            .get(fh)
            .ok_or(VfsError::InvalidHandle(fh))
    }

    fn with_handle<T>(
        &self,
        fh: u64,
        op: impl FnOnce(&mut Handle, &VfsInner) -> VfsResult<T>,
    ) -> VfsResult<T> {
        let handle = self.handle(fh)?;
        let mut handle = handle.lock();
        if handle.is_closed() {
            return Err(VfsError::InvalidHandle(fh));
        }
        op(&mut handle, &self.inner)
    }

    fn attr(&self, file_path: &str, entry: &RemoteEntry) -> FileAttr {
        let options = &self.inner.options;
        if entry.is_dir {
            return FileAttr {
                kind: FileKind::Directory,
                size: 0,
                mod_time: entry.mod_time,
                perm: options.dir_perms & 0o777,
                uid: options.uid,
                gid: options.gid,
            };
        }
        let (size, mod_time) = match self.inner.nodes.get(file_path) {
            Some(node) => {
                let meta = node.meta();
                (meta.size, meta.mod_time)
            }
            None => (self.dirty_size(file_path).unwrap_or(entry.size), entry.mod_time),
        };
        FileAttr {
            kind: FileKind::File,
            size,
            mod_time,
            perm: options.file_perms & 0o777,
            uid: options.uid,
            gid: options.gid,
        }
    }

    /// Size of a dirty cache copy awaiting write-back, unless an upload
    /// holds it right now.
    fn dirty_size(&self, file_path: &str) -> Option<u64> {
        let entry = self.inner.store.get(file_path)?;
        let state = entry.try_lock()?;
        (state.is_dirty() && !state.is_detached()).then(|| state.size())
    }

    /// Whether `file_path` has local content the remote has not seen.
    fn has_dirty_copy(&self, file_path: &str) -> bool {
        self.inner
            .store
            .get(file_path)
            .is_some_and(|entry| entry.is_dirty())
    }

    /// Looks `file_path` up, mapping "absent" to `None`.
    fn find(&self, file_path: &str) -> VfsResult<Option<RemoteEntry>> {
        match self.inner.dirs.lookup(file_path) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn require_parent_dir(&self, file_path: &str) -> VfsResult<()> {
        let (parent, _) = path::split(file_path);
        let entry = self.inner.dirs.lookup(parent)?;
        if !entry.is_dir {
            return Err(VfsError::NotDirectory(parent.to_string()));
        }
        Ok(())
    }

    /// Opens a file and returns its handle ID.
    ///
    /// The handle variant comes from the cache mode and `flags`; see
    /// [`policy::resolve`].
    #[instrument(level = "debug", skip(self), fields(mode = %self.inner.options.cache_mode))]
    pub fn open(&self, file_path: &str, flags: OpenFlags) -> VfsResult<u64> {
        self.check_live()?;
        let file_path = path::normalize(file_path);
        if file_path.is_empty() {
            return Err(VfsError::IsDirectory(file_path));
        }
        let mut existing = self.find(&file_path)?;
        match &existing {
            Some(entry) if entry.is_dir => return Err(VfsError::IsDirectory(file_path)),
            Some(_) if flags.create && flags.exclusive => {
                return Err(VfsError::AlreadyExists(file_path));
            }
            None if !flags.create => return Err(VfsError::NotFound(file_path)),
            None => self.require_parent_dir(&file_path)?,
            Some(_) => {}
        }

        let inner = &self.inner;
        let plan = policy::resolve(inner.options.cache_mode, flags);
        let writer = plan.kind.can_write().then_some(plan.kind);
        let created = existing.is_none();
        if created && plan.kind == HandleKind::DirectRead {
            // Nothing will ever be uploaded through this handle.
            let committed = inner.remote.open_write(&file_path)?.commit()?;
            handle::publish(inner, &file_path, committed.clone());
            existing = Some(committed);
        }

        let meta = existing.as_ref().map_or_else(FileMeta::new_local, FileMeta::from);
        let node = inner.nodes.open(&file_path, meta, writer)?;
        let handle = match Handle::open(
            inner,
            Arc::clone(&node),
            flags,
            plan,
            existing.as_ref(),
            created,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                inner.nodes.close(&node, writer.is_some());
                return Err(e);
            }
        };

        if created && plan.kind != HandleKind::DirectRead {
            let (dir, name) = path::split(&file_path);
            inner
                .dirs
                .add_entry(dir, RemoteEntry::file(name, 0, SystemTime::now()));
            inner.dirs.invalidate(dir);
        }

        let fh = inner.handles.insert(Arc::new(Mutex::new(handle)));
        inner.stats.record_open();
        debug!(path = %file_path, fh, kind = %plan.kind, created, "file opened");
        Ok(fh)
    }

    /// Reads into `buf` at `offset`. A short count means end of file.
    pub fn read(&self, fh: u64, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        trace!(fh, offset, size = buf.len(), "read");
        self.with_handle(fh, |handle, inner| handle.read(inner, offset, buf))
    }

    /// Writes `data` at `offset`. Returns the number of bytes written.
    pub fn write(&self, fh: u64, offset: u64, data: &[u8]) -> VfsResult<usize> {
        trace!(fh, offset, size = data.len(), "write");
        self.with_handle(fh, |handle, inner| handle.write(inner, offset, data))
    }

    /// Moves a handle's offset and returns the new one.
    pub fn seek(&self, fh: u64, pos: SeekFrom) -> VfsResult<u64> {
        trace!(fh, ?pos, "seek");
        self.with_handle(fh, |handle, _| handle.seek(pos))
    }

    /// Sets the length of the file open as `fh`.
    pub fn truncate(&self, fh: u64, size: u64) -> VfsResult<()> {
        trace!(fh, size, "truncate");
        self.with_handle(fh, |handle, _| handle.truncate(size))
    }

    /// Closes a handle, writing back buffered changes.
    ///
    /// On [`VfsError::WriteBackFailed`] the handle is still gone but the
    /// content stays dirty in the cache for the reconciler to retry.
    pub fn close(&self, fh: u64) -> VfsResult<()> {
        self.check_live()?;
        let handle = self
            .inner
            .handles
            .remove(fh)
            .ok_or(VfsError::InvalidHandle(fh))?;
        let mut handle = handle.lock();
        let result = handle.close(&self.inner);
        self.inner.nodes.close(handle.node(), handle.is_writer());
        self.inner.stats.record_close();
        debug!(fh, ok = result.is_ok(), "file closed");
        result
    }

    /// The variant a handle was opened as.
    pub fn handle_kind(&self, fh: u64) -> VfsResult<HandleKind> {
        self.with_handle(fh, |handle, _| Ok(handle.kind()))
    }

    /// Lists a directory.
    pub fn readdir(&self, dir: &str) -> VfsResult<Vec<DirEntry>> {
        self.check_live()?;
        let dir = path::normalize(dir);
        trace!(path = %dir, "readdir");
        let entries = self.inner.dirs.readdir(&dir)?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let attr = self.attr(&path::join(&dir, &entry.name), &entry);
                DirEntry {
                    name: entry.name,
                    attr,
                }
            })
            .collect())
    }

    /// Returns the attributes of `target`.
    pub fn stat(&self, target: &str) -> VfsResult<FileAttr> {
        self.check_live()?;
        let target = path::normalize(target);
        let entry = self.inner.dirs.lookup(&target)?;
        Ok(self.attr(&target, &entry))
    }

    /// Creates a directory.
    #[instrument(level = "debug", skip(self))]
    pub fn mkdir(&self, dir: &str) -> VfsResult<()> {
        self.check_live()?;
        let dir = path::normalize(dir);
        if dir.is_empty() || self.find(&dir)?.is_some() {
            return Err(VfsError::AlreadyExists(dir));
        }
        self.require_parent_dir(&dir)?;
        self.inner.remote.mkdir(&dir)?;

        let (parent, name) = path::split(&dir);
        self.inner
            .dirs
            .add_entry(parent, RemoteEntry::dir(name, SystemTime::now()));
        self.inner.dirs.seed_empty(&dir);
        self.inner.dirs.invalidate(parent);
        Ok(())
    }

    /// Removes a file or an empty directory.
    ///
    /// Open handles on a removed file keep working on their local state,
    /// but nothing is written back when they close.
    #[instrument(level = "debug", skip(self))]
    pub fn remove(&self, target: &str) -> VfsResult<()> {
        self.check_live()?;
        let target = path::normalize(target);
        if target.is_empty() {
            return Err(VfsError::InvalidArgument("cannot remove the root".to_string()));
        }
        let inner = &self.inner;
        let entry = inner.dirs.lookup(&target)?;
        if entry.is_dir {
            if !inner.dirs.readdir(&target)?.is_empty() {
                return Err(VfsError::NotEmpty(target));
            }
            inner.remote.rmdir(&target)?;
        } else {
            match inner.remote.remove(&target) {
                Ok(()) => {}
                // Created locally and not uploaded yet.
                Err(e)
                    if e.is_not_found()
                        && (inner.nodes.get(&target).is_some() || self.has_dirty_copy(&target)) => {}
                Err(e) => return Err(e.into()),
            }
            if let Some(node) = inner.nodes.detach(&target) {
                debug!(path = %target, handles = node.open_count(), "removed while open");
            }
            inner.store.detach(&target);
        }

        let (parent, name) = path::split(&target);
        inner.dirs.remove_entry(parent, name);
        inner.dirs.invalidate(parent);
        Ok(())
    }

    /// Moves a file or directory. An existing file at `dst` is replaced;
    /// an existing directory is not.
    #[instrument(level = "debug", skip(self))]
    pub fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        self.check_live()?;
        let src = path::normalize(src);
        let dst = path::normalize(dst);
        if src.is_empty() || dst.is_empty() || path::is_descendant(&dst, &src) {
            return Err(VfsError::InvalidArgument(format!(
                "cannot move {src:?} to {dst:?}"
            )));
        }
        if src == dst {
            return Ok(());
        }
        let inner = &self.inner;
        let entry = inner.dirs.lookup(&src)?;
        match self.find(&dst)? {
            Some(existing) if existing.is_dir => return Err(VfsError::AlreadyExists(dst)),
            Some(_) if entry.is_dir => return Err(VfsError::NotDirectory(dst)),
            Some(_) => {}
            None => self.require_parent_dir(&dst)?,
        }

        let affected: Vec<_> = inner
            .nodes
            .nodes()
            .into_iter()
            .filter(|node| {
                let p = node.path();
                p == src || path::is_descendant(&p, &src)
            })
            .collect();
        if affected
            .iter()
            .any(|node| node.writer() == Some(HandleKind::DirectWrite))
        {
            return Err(VfsError::Busy(src));
        }

        let local_only = !entry.is_dir
            && affected
                .first()
                .is_some_and(|node| !node.meta().exists_remotely);
        if !local_only {
            match inner.remote.rename(&src, &dst) {
                Ok(()) => {}
                // Only the dirty cache copy exists; it is uploaded under the new name.
                Err(e) if e.is_not_found() && !entry.is_dir && self.has_dirty_copy(&src) => {}
                Err(e) => return Err(e.into()),
            }
        }
        inner.nodes.rename(&src, &dst);
        inner.store.rename(&src, &dst)?;
        inner.dirs.rename_entry(&src, &dst, entry);
        inner.dirs.invalidate(path::split(&src).0);
        inner.dirs.invalidate(path::split(&dst).0);
        Ok(())
    }

    /// Marks every cached directory listing stale.
    pub fn flush_dir_cache(&self) {
        self.inner.dirs.flush_all();
    }

    /// A cheap handle that can flush the directory cache from elsewhere.
    pub fn flush_handle(&self) -> FlushHandle {
        FlushHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Flushes the directory cache on every `SIGHUP` until the returned
    /// trigger is dropped.
    pub fn install_flush_signal(&self) -> VfsResult<FlushTrigger> {
        let flush = self.flush_handle();
        Ok(FlushTrigger::spawn(move || {
            flush.flush();
        })?)
    }

    /// Runs one reconciliation cycle now.
    pub fn reconcile_now(&self) -> VfsResult<CycleReport> {
        self.check_live()?;
        Ok(reconciler::run_cycle(&self.inner))
    }

    /// Engine statistics.
    pub fn stats(&self) -> &VfsStats {
        &self.inner.stats
    }

    /// The configuration snapshot this engine runs with.
    pub fn options(&self) -> &VfsOptions {
        &self.inner.options
    }

    /// The on-disk cache store.
    pub fn cache(&self) -> &CacheStore {
        &self.inner.store
    }

    /// Root of this engine's cache area.
    pub fn cache_root(&self) -> &Path {
        self.inner.store.root()
    }

    /// The directory tree cache.
    pub fn dir_cache(&self) -> &DirTree {
        &self.inner.dirs
    }

    /// Number of open handles.
    pub fn open_handles(&self) -> usize {
        self.inner.handles.len()
    }

    /// Closes every handle and stops the reconciler. Idempotent.
    ///
    /// Returns the first close error in graceful mode; the remaining
    /// handles are still closed.
    pub fn shutdown(&self, mode: ShutdownMode) -> VfsResult<()> {
        let inner = &self.inner;
        if inner.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(?mode, handles = inner.handles.len(), "vfs shutting down");
        let mut first_err = None;
        for fh in inner.handles.ids() {
            let Some(handle) = inner.handles.remove(fh) else {
                continue;
            };
            let mut handle = handle.lock();
            match mode {
                ShutdownMode::Graceful => {
                    if let Err(e) = handle.close(inner) {
                        warn!(fh, error = %e, "close during shutdown failed");
                        first_err.get_or_insert(e);
                    }
                }
                ShutdownMode::Abandon => handle.abandon(inner),
            }
            inner.nodes.close(handle.node(), handle.is_writer());
            inner.stats.record_close();
        }
        let reconciler = inner.reconciler.lock().take();
        if let Some(mut reconciler) = reconciler {
            reconciler.stop();
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Removes this engine's cache area from disk, shutting down first if
    /// needed. Dirty content still in the cache is lost.
    pub fn clean_up(&self) -> VfsResult<()> {
        if !self.inner.shut_down.load(Ordering::Acquire) {
            self.shutdown(ShutdownMode::Graceful)?;
        }
        self.inner.store.clean_up()
    }
}

impl Drop for Vfs {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown(ShutdownMode::Graceful) {
            warn!(error = %e, "shutdown on drop failed");
        }
    }
}

/// Flushes a [`Vfs`]'s directory cache without keeping the engine alive.
#[derive(Debug, Clone)]
pub struct FlushHandle {
    inner: Weak<VfsInner>,
}

impl FlushHandle {
    /// Flushes the directory cache. Returns false once the engine is gone.
    pub fn flush(&self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.dirs.flush_all();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheMode;
    use objvfs_remote::MemoryRemote;
    use tempfile::TempDir;

    fn engine(mode: CacheMode) -> (TempDir, MemoryRemote, Vfs) {
        let cache = TempDir::new().unwrap();
        let remote = MemoryRemote::new();
        let options = VfsOptions::default()
            .cache_mode(mode)
            .cache_dir(cache.path());
        let vfs = Vfs::new(Arc::new(remote.clone()), options).unwrap();
        (cache, remote, vfs)
    }

    #[test]
    fn test_open_missing_without_create() {
        let (_cache, _remote, vfs) = engine(CacheMode::Off);
        let err = vfs.open("/nope", OpenFlags::read_only()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_open_exclusive_existing() {
        let (_cache, remote, vfs) = engine(CacheMode::Writes);
        remote.insert_object("f", b"x".to_vec());
        let err = vfs
            .open("f", OpenFlags::write_only().create().exclusive())
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists(_)));
    }

    #[test]
    fn test_open_directory_is_refused() {
        let (_cache, remote, vfs) = engine(CacheMode::Full);
        remote.insert_object("d/f", b"x".to_vec());
        let err = vfs.open("d", OpenFlags::read_only()).unwrap_err();
        assert!(matches!(err, VfsError::IsDirectory(_)));
    }

    #[test]
    fn test_create_in_missing_directory() {
        let (_cache, _remote, vfs) = engine(CacheMode::Writes);
        let err = vfs
            .open("/missing/f", OpenFlags::write_only().create())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unknown_handle() {
        let (_cache, _remote, vfs) = engine(CacheMode::Off);
        let mut buf = [0u8; 4];
        assert!(matches!(
            vfs.read(42, 0, &mut buf),
            Err(VfsError::InvalidHandle(42))
        ));
        assert!(matches!(vfs.close(42), Err(VfsError::InvalidHandle(42))));
    }

    #[test]
    fn test_second_writer_busy() {
        let (_cache, _remote, vfs) = engine(CacheMode::Writes);
        let fh = vfs.open("f", OpenFlags::write_only().create()).unwrap();
        let err = vfs.open("f", OpenFlags::read_write()).unwrap_err();
        assert!(matches!(err, VfsError::Busy(_)));
        assert_eq!(err.to_errno(), libc::EBUSY);
        vfs.close(fh).unwrap();
    }

    #[test]
    fn test_stat_reports_synthesized_permissions() {
        let (_cache, remote, vfs) = engine(CacheMode::Off);
        remote.insert_object("d/f", b"abc".to_vec());
        let file = vfs.stat("/d/f").unwrap();
        assert_eq!(file.kind, FileKind::File);
        assert_eq!(file.size, 3);
        assert_eq!(file.perm, 0o666);
        let dir = vfs.stat("/d").unwrap();
        assert_eq!(dir.kind, FileKind::Directory);
        assert_eq!(dir.perm, 0o777);
        assert_eq!(vfs.stat("/").unwrap().kind, FileKind::Directory);
    }

    #[test]
    fn test_mkdir_and_remove() {
        let (_cache, remote, vfs) = engine(CacheMode::Off);
        vfs.mkdir("/d").unwrap();
        assert!(remote.has_dir("d"));
        assert!(vfs.readdir("/d").unwrap().is_empty());
        assert!(matches!(vfs.mkdir("/d"), Err(VfsError::AlreadyExists(_))));

        let fh = vfs.open("/d/f", OpenFlags::write_only().create().truncate()).unwrap();
        vfs.close(fh).unwrap();
        assert!(matches!(vfs.remove("/d"), Err(VfsError::NotEmpty(_))));
        vfs.remove("/d/f").unwrap();
        vfs.remove("/d").unwrap();
        assert!(vfs.stat("/d").unwrap_err().is_not_found());
    }

    #[test]
    fn test_operations_after_shutdown() {
        let (_cache, _remote, vfs) = engine(CacheMode::Writes);
        vfs.shutdown(ShutdownMode::Graceful).unwrap();
        assert!(matches!(vfs.stat("/"), Err(VfsError::ShutDown)));
        assert!(matches!(
            vfs.open("f", OpenFlags::write_only().create()),
            Err(VfsError::ShutDown)
        ));
        // Second shutdown is a no-op.
        vfs.shutdown(ShutdownMode::Abandon).unwrap();
    }

    #[test]
    fn test_flush_handle_outlives_engine() {
        let (_cache, _remote, vfs) = engine(CacheMode::Off);
        let flush = vfs.flush_handle();
        assert!(flush.flush());
        drop(vfs);
        assert!(!flush.flush());
    }
}
