//! On-disk cache store.
//!
//! Each cached file is a sparse local copy at `<root>/data/<remote path>`
//! with the same length as the logical file. Which byte ranges have been
//! fetched from the remote is tracked per entry, so `writes` mode can fetch
//! only what is read and `full` mode can tell a completed download from a
//! partial one.
//!
//! Dirty entries also get a JSON sidecar at `<root>/meta/<remote path>.json`.
//! The sidecar survives a crash; the next [`CacheStore::open`] re-adopts the
//! entry as dirty and unpinned so the reconciler uploads it.
//!
//! # Locking
//!
//! Each entry has one mutex, held for the whole of a download or upload.
//! That serializes write-back per file: a new handle pinning the entry
//! blocks until an in-flight upload finishes. The index map is only ever
//! locked after an entry lock, never before.

use crate::error::{VfsError, VfsResult};
use crate::ranges::RangeSet;
use crate::stats::VfsStats;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use objvfs_remote::{Remote, RemoteEntry, RemoteError, path};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

const DATA_DIR: &str = "data";
const META_DIR: &str = "meta";
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Remote size and modification time a clean copy was populated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Remote object size.
    pub size: u64,
    /// Remote modification time.
    pub mod_time: SystemTime,
}

impl From<&RemoteEntry> for Fingerprint {
    fn from(entry: &RemoteEntry) -> Self {
        Self {
            size: entry.size,
            mod_time: entry.mod_time,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    path: String,
    dirty: bool,
    size: u64,
    source_size: u64,
    ranges: RangeSet,
    fingerprint: Option<Fingerprint>,
}

/// Mutable state of one cache entry. Only reachable through the entry lock.
#[derive(Debug)]
pub(crate) struct EntryState {
    path: String,
    data_path: PathBuf,
    meta_path: PathBuf,
    file: File,
    /// Fetched (or locally written) byte ranges.
    ranges: RangeSet,
    /// Logical file size; the data file always has this length.
    size: u64,
    /// Prefix of the file still backed by the remote object.
    source_size: u64,
    fingerprint: Option<Fingerprint>,
    dirty: bool,
    pins: u32,
    last_access: Instant,
    /// Removed from the index; the owner must not resurrect it.
    detached: bool,
}

impl EntryState {
    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn pins(&self) -> u32 {
        self.pins
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached
    }

    pub(crate) fn idle_for(&self) -> std::time::Duration {
        self.last_access.elapsed()
    }

    /// Returns true once every remote-backed byte is local.
    pub(crate) fn is_complete(&self) -> bool {
        self.ranges.covers(0, self.source_size)
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    fn io_err(&self, e: io::Error) -> VfsError {
        VfsError::cache_io(&self.data_path, e)
    }

    /// Fetches the missing parts of `[start, end)` that the remote still backs.
    pub(crate) fn fetch(
        &mut self,
        remote: &dyn Remote,
        stats: &VfsStats,
        start: u64,
        end: u64,
    ) -> VfsResult<()> {
        let end = end.min(self.source_size);
        for (gap_start, gap_end) in self.ranges.missing(start, end) {
            trace!(path = %self.path, gap_start, gap_end, "fetching range");
            let mut reader = remote.open_read(&self.path, gap_start)?;
            let mut buf = vec![0u8; COPY_BUF_SIZE];
            let mut pos = gap_start;
            let result: VfsResult<()> = loop {
                if pos >= gap_end {
                    break Ok(());
                }
                let want = usize::try_from(gap_end - pos)
                    .unwrap_or(usize::MAX)
                    .min(buf.len());
                let n = match reader.read(&mut buf[..want]) {
                    Ok(0) => break Ok(()),
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => break Err(RemoteError::from_io(&self.path, e).into()),
                };
                if let Err(e) = self
                    .file
                    .seek(SeekFrom::Start(pos))
                    .and_then(|_| self.file.write_all(&buf[..n]))
                {
                    break Err(self.io_err(e));
                }
                pos += n as u64;
            };
            if pos > gap_start {
                self.ranges.insert(gap_start, pos);
                stats.record_download(pos - gap_start);
            }
            result?;
            if pos < gap_end {
                // The object shrank since we observed it; the rest reads as zeros.
                warn!(path = %self.path, expected = gap_end, got = pos, "remote object shorter than expected");
                self.source_size = pos;
                break;
            }
        }
        Ok(())
    }

    /// Downloads everything not yet local.
    pub(crate) fn fetch_all(&mut self, remote: &dyn Remote, stats: &VfsStats) -> VfsResult<()> {
        let source_size = self.source_size;
        self.fetch(remote, stats, 0, source_size)
    }

    /// Reads into `buf` at `offset`, fetching missing ranges first.
    pub(crate) fn read_at(
        &mut self,
        remote: &dyn Remote,
        stats: &VfsStats,
        offset: u64,
        buf: &mut [u8],
    ) -> VfsResult<usize> {
        self.touch();
        if offset >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let end = offset.saturating_add(buf.len() as u64).min(self.size);
        self.fetch(remote, stats, offset, end)?;
        let n = usize::try_from(end - offset).unwrap_or(buf.len());
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(&mut buf[..n]))
            .map_err(|e| self.io_err(e))?;
        Ok(n)
    }

    /// Writes `data` at `offset`, growing the file as needed.
    pub(crate) fn write_at(&mut self, offset: u64, data: &[u8]) -> VfsResult<()> {
        self.touch();
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(data))
            .map_err(|e| self.io_err(e))?;
        let end = offset + data.len() as u64;
        let grew = self.ranges.insert(offset, end) && offset < self.source_size;
        self.size = self.size.max(end);
        let became_dirty = !self.dirty;
        self.dirty = true;
        if (became_dirty || grew) && !self.detached {
            self.persist_sidecar()?;
        }
        Ok(())
    }

    /// Sets the file length. Shrinking below the remote size drops the tail.
    pub(crate) fn truncate(&mut self, size: u64) -> VfsResult<()> {
        self.touch();
        self.file.set_len(size).map_err(|e| self.io_err(e))?;
        if size < self.source_size {
            self.source_size = size;
        }
        self.ranges.truncate(size.max(self.source_size));
        self.size = size;
        self.dirty = true;
        if self.detached {
            return Ok(());
        }
        self.persist_sidecar()
    }

    /// Drops a clean copy whose remote fingerprint changed. `None` means
    /// the object no longer exists remotely.
    pub(crate) fn refresh(&mut self, current: Option<Fingerprint>) -> VfsResult<bool> {
        if self.dirty || self.fingerprint == current {
            return Ok(false);
        }
        debug!(path = %self.path, "cached copy is stale, discarding");
        let size = current.map_or(0, |fp| fp.size);
        self.file
            .set_len(0)
            .and_then(|()| self.file.set_len(size))
            .map_err(|e| self.io_err(e))?;
        self.ranges.clear();
        self.size = size;
        self.source_size = size;
        self.fingerprint = current;
        Ok(true)
    }

    /// Uploads the whole local copy and marks the entry clean.
    pub(crate) fn upload(
        &mut self,
        remote: &dyn Remote,
        stats: &VfsStats,
    ) -> VfsResult<RemoteEntry> {
        self.fetch_all(remote, stats)?;
        let started = Instant::now();
        let mut writer = remote.open_write(&self.path)?;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| self.io_err(e))?;
        let mut reader = (&self.file).take(self.size);
        let copied = match io::copy(&mut reader, &mut writer) {
            Ok(n) => n,
            Err(e) => {
                writer.abort();
                return Err(RemoteError::from_io(&self.path, e).into());
            }
        };
        let entry = writer.commit()?;
        stats.record_upload(copied, started.elapsed());

        self.dirty = false;
        self.fingerprint = Some(Fingerprint::from(&entry));
        self.source_size = self.size;
        self.ranges = RangeSet::full(self.size);
        self.remove_sidecar();
        debug!(path = %self.path, size = copied, "write-back complete");
        Ok(entry)
    }

    pub(crate) fn persist_sidecar(&self) -> VfsResult<()> {
        let sidecar = Sidecar {
            path: self.path.clone(),
            dirty: self.dirty,
            size: self.size,
            source_size: self.source_size,
            ranges: self.ranges.clone(),
            fingerprint: self.fingerprint,
        };
        let json = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| VfsError::cache_io(&self.meta_path, io::Error::other(e)))?;
        if let Some(parent) = self.meta_path.parent() {
            fs::create_dir_all(parent).map_err(|e| VfsError::cache_io(parent, e))?;
        }
        let tmp = self.meta_path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|()| fs::rename(&tmp, &self.meta_path))
            .map_err(|e| VfsError::cache_io(&self.meta_path, e))
    }

    fn remove_sidecar(&self) {
        remove_if_exists(&self.meta_path);
    }

    fn remove_files(&self) {
        remove_if_exists(&self.data_path);
        remove_if_exists(&self.meta_path);
    }
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove cache file");
    }
}

/// The on-disk copy of one file's content.
#[derive(Debug)]
pub struct CacheEntry {
    state: Mutex<EntryState>,
}

impl CacheEntry {
    pub(crate) fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock()
    }

    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, EntryState>> {
        self.state.try_lock()
    }

    /// Remote path this entry caches.
    pub fn path(&self) -> String {
        self.state.lock().path.clone()
    }

    /// Logical file size.
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    /// Whether local content awaits write-back.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Number of handles pinning this entry.
    pub fn pins(&self) -> u32 {
        self.state.lock().pins
    }

    /// Bytes present locally.
    pub fn cached_bytes(&self) -> u64 {
        let state = self.state.lock();
        state.ranges.covered_bytes().min(state.size)
    }
}

/// Index of cache entries plus their storage area.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    entries: DashMap<String, Arc<CacheEntry>>,
    stats: Arc<VfsStats>,
}

impl CacheStore {
    /// Opens the cache area at `root`, re-adopting dirty entries left by a
    /// previous run and deleting orphaned data files.
    pub fn open(root: &Path, stats: Arc<VfsStats>) -> VfsResult<Self> {
        for dir in [DATA_DIR, META_DIR] {
            let dir = root.join(dir);
            fs::create_dir_all(&dir).map_err(|e| VfsError::cache_io(&dir, e))?;
        }
        let store = Self {
            root: root.to_path_buf(),
            entries: DashMap::new(),
            stats,
        };
        let adopted = store.adopt_sidecars();
        store.remove_orphans();
        info!(root = %root.display(), adopted, "cache store opened");
        Ok(store)
    }

    /// Root of the cache area.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, remote_path: &str) -> PathBuf {
        let mut p = self.root.join(DATA_DIR);
        for segment in path::segments(remote_path) {
            p.push(segment);
        }
        p
    }

    fn meta_path(&self, remote_path: &str) -> PathBuf {
        let mut p = self.root.join(META_DIR);
        for segment in path::segments(remote_path) {
            p.push(segment);
        }
        let mut name = p.into_os_string();
        name.push(".json");
        PathBuf::from(name)
    }

    fn adopt_sidecars(&self) -> usize {
        let mut adopted = 0;
        let meta_root = self.root.join(META_DIR);
        for item in WalkDir::new(&meta_root).into_iter().filter_map(Result::ok) {
            let file = item.path();
            if !item.file_type().is_file() {
                continue;
            }
            if file.extension().is_none_or(|ext| ext != "json") {
                remove_if_exists(file);
                continue;
            }
            match self.adopt_one(file) {
                Ok(true) => adopted += 1,
                Ok(false) => remove_if_exists(file),
                Err(e) => {
                    warn!(sidecar = %file.display(), error = %e, "dropping unreadable cache sidecar");
                    remove_if_exists(file);
                }
            }
        }
        adopted
    }

    fn adopt_one(&self, sidecar_path: &Path) -> VfsResult<bool> {
        let bytes = fs::read(sidecar_path).map_err(|e| VfsError::cache_io(sidecar_path, e))?;
        let sidecar: Sidecar = serde_json::from_slice(&bytes)
            .map_err(|e| VfsError::cache_io(sidecar_path, io::Error::other(e)))?;
        if !sidecar.dirty {
            return Ok(false);
        }
        let data_path = self.data_path(&sidecar.path);
        let file = match OpenOptions::new().read(true).write(true).open(&data_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %sidecar.path, "dirty entry lost its data file");
                return Ok(false);
            }
            Err(e) => return Err(VfsError::cache_io(&data_path, e)),
        };
        let size = file
            .metadata()
            .map_err(|e| VfsError::cache_io(&data_path, e))?
            .len();
        debug!(path = %sidecar.path, size, "re-adopting dirty cache entry");
        let state = EntryState {
            meta_path: self.meta_path(&sidecar.path),
            data_path,
            file,
            ranges: sidecar.ranges,
            size,
            source_size: sidecar.source_size.min(size),
            fingerprint: sidecar.fingerprint,
            dirty: true,
            pins: 0,
            last_access: Instant::now(),
            detached: false,
            path: sidecar.path.clone(),
        };
        self.entries.insert(
            sidecar.path,
            Arc::new(CacheEntry {
                state: Mutex::new(state),
            }),
        );
        Ok(true)
    }

    fn remove_orphans(&self) {
        let data_root = self.root.join(DATA_DIR);
        for item in WalkDir::new(&data_root)
            .contents_first(true)
            .into_iter()
            .filter_map(Result::ok)
        {
            let file = item.path();
            if item.file_type().is_dir() {
                if file != data_root {
                    // Only succeeds when empty.
                    let _ = fs::remove_dir(file);
                }
                continue;
            }
            let Some(remote_path) = file
                .strip_prefix(&data_root)
                .ok()
                .and_then(Path::to_str)
                .map(|p| p.replace(std::path::MAIN_SEPARATOR, "/"))
            else {
                continue;
            };
            if !self.entries.contains_key(&remote_path) {
                trace!(path = %remote_path, "removing orphaned cache file");
                remove_if_exists(file);
            }
        }
    }

    fn create_entry(
        &self,
        remote_path: &str,
        fingerprint: Option<Fingerprint>,
    ) -> VfsResult<CacheEntry> {
        let data_path = self.data_path(remote_path);
        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent).map_err(|e| VfsError::cache_io(parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&data_path)
            .map_err(|e| VfsError::cache_io(&data_path, e))?;
        let size = fingerprint.map_or(0, |fp| fp.size);
        file.set_len(size)
            .map_err(|e| VfsError::cache_io(&data_path, e))?;
        trace!(path = remote_path, size, "cache entry created");
        Ok(CacheEntry {
            state: Mutex::new(EntryState {
                path: remote_path.to_string(),
                meta_path: self.meta_path(remote_path),
                data_path,
                file,
                ranges: RangeSet::new(),
                size,
                source_size: size,
                fingerprint,
                dirty: false,
                pins: 0,
                last_access: Instant::now(),
                detached: false,
            }),
        })
    }

    /// Pins the entry for `remote_path`, creating it if needed.
    ///
    /// `fingerprint` describes the remote object as currently observed, or
    /// `None` if it does not exist remotely. A clean entry populated from a
    /// different fingerprint is discarded first.
    pub(crate) fn acquire(
        &self,
        remote_path: &str,
        fingerprint: Option<Fingerprint>,
    ) -> VfsResult<Arc<CacheEntry>> {
        loop {
            let entry = match self.entries.entry(remote_path.to_string()) {
                Entry::Occupied(occupied) => Arc::clone(occupied.get()),
                Entry::Vacant(vacant) => {
                    let created = Arc::new(self.create_entry(remote_path, fingerprint)?);
                    vacant.insert(Arc::clone(&created));
                    created
                }
            };
            let mut state = entry.lock();
            if state.detached {
                // Purged between lookup and lock.
                continue;
            }
            state.refresh(fingerprint)?;
            state.pins += 1;
            state.touch();
            drop(state);
            return Ok(entry);
        }
    }

    /// Unpins `entry`. Clean, unpinned entries are purged unless retained.
    pub(crate) fn release(&self, entry: &Arc<CacheEntry>, retain: bool) {
        let mut state = entry.lock();
        state.pins = state.pins.saturating_sub(1);
        state.touch();
        if state.detached {
            return;
        }
        if state.dirty {
            if let Err(e) = state.persist_sidecar() {
                warn!(path = %state.path, error = %e, "failed to persist cache sidecar");
            }
        } else if state.pins == 0 && !retain {
            self.purge_locked(entry, &mut state);
        }
    }

    /// Deletes an entry's storage and drops it from the index.
    pub(crate) fn purge_locked(&self, entry: &Arc<CacheEntry>, state: &mut EntryState) {
        state.detached = true;
        state.remove_files();
        self.entries
            .remove_if(&state.path, |_, indexed| Arc::ptr_eq(indexed, entry));
        self.stats.record_purge();
        debug!(path = %state.path, "cache entry purged");
    }

    /// Forgets the entry for a path deleted remotely. Open handles keep
    /// their file descriptor; nothing is written back.
    pub(crate) fn detach(&self, remote_path: &str) {
        if let Some((_, entry)) = self.entries.remove(remote_path) {
            let mut state = entry.lock();
            state.detached = true;
            state.dirty = false;
            state.remove_files();
            debug!(path = remote_path, "cache entry detached");
        }
    }

    /// Re-keys entries at or below `src` to live under `dst`.
    pub(crate) fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        let moved: Vec<(String, Arc<CacheEntry>)> = self
            .entries
            .iter()
            .filter(|e| e.key() == src || path::is_descendant(e.key(), src))
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        for (old_path, entry) in moved {
            let new_path = path::rebase(&old_path, src, dst);
            self.detach(&new_path);

            let mut state = entry.lock();
            if state.detached {
                continue;
            }
            let new_data = self.data_path(&new_path);
            if let Some(parent) = new_data.parent() {
                fs::create_dir_all(parent).map_err(|e| VfsError::cache_io(parent, e))?;
            }
            fs::rename(&state.data_path, &new_data)
                .map_err(|e| VfsError::cache_io(&state.data_path, e))?;
            state.remove_sidecar();
            state.path.clone_from(&new_path);
            state.data_path = new_data;
            state.meta_path = self.meta_path(&new_path);
            if state.dirty {
                state.persist_sidecar()?;
            }
            self.entries
                .remove_if(&old_path, |_, indexed| Arc::ptr_eq(indexed, &entry));
            drop(state);
            self.entries.insert(new_path, entry);
            trace!(from = %old_path, to = dst, "cache entry renamed");
        }
        Ok(())
    }

    /// Looks up the entry for `remote_path`.
    pub fn get(&self, remote_path: &str) -> Option<Arc<CacheEntry>> {
        self.entries.get(remote_path).map(|e| Arc::clone(e.value()))
    }

    /// Snapshot of every indexed entry.
    pub fn entries(&self) -> Vec<Arc<CacheEntry>> {
        self.entries.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes the whole cache area from disk.
    pub fn clean_up(&self) -> VfsResult<()> {
        self.entries.clear();
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VfsError::cache_io(&self.root, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objvfs_remote::MemoryRemote;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CacheStore, MemoryRemote, Arc<VfsStats>) {
        let dir = TempDir::new().unwrap();
        let stats = Arc::new(VfsStats::new());
        let store = CacheStore::open(dir.path(), Arc::clone(&stats)).unwrap();
        (dir, store, MemoryRemote::new(), stats)
    }

    fn fingerprint(remote: &MemoryRemote, p: &str) -> Fingerprint {
        Fingerprint::from(&remote.stat(p).unwrap())
    }

    #[test]
    fn test_lazy_read_fetches_only_requested_range() {
        let (_dir, store, remote, stats) = setup();
        remote.insert_object("f", (0u8..100).collect::<Vec<_>>());
        let entry = store.acquire("f", Some(fingerprint(&remote, "f"))).unwrap();

        let mut buf = [0u8; 10];
        let n = entry
            .lock()
            .read_at(&remote, &stats, 20, &mut buf)
            .unwrap();
        assert_eq!(n, 10);
        assert_eq!(buf[0], 20);
        assert_eq!(remote.counters().read_bytes, 10);
        assert_eq!(entry.cached_bytes(), 10);

        // Already present: no second fetch.
        entry
            .lock()
            .read_at(&remote, &stats, 22, &mut buf[..4])
            .unwrap();
        assert_eq!(remote.counters().read_calls, 1);
    }

    #[test]
    fn test_upload_fills_missing_ranges() {
        let (_dir, store, remote, stats) = setup();
        remote.insert_object("f", b"abcdefgh".to_vec());
        let entry = store.acquire("f", Some(fingerprint(&remote, "f"))).unwrap();
        {
            let mut state = entry.lock();
            state.write_at(2, b"XY").unwrap();
            assert!(state.is_dirty());
            assert!(!state.is_complete());
            let uploaded = state.upload(&remote, &stats).unwrap();
            assert_eq!(uploaded.size, 8);
            assert!(!state.is_dirty());
        }
        assert_eq!(remote.object("f").unwrap(), b"abXYefgh");
    }

    #[test]
    fn test_truncate_drops_remote_tail() {
        let (_dir, store, remote, stats) = setup();
        remote.insert_object("f", b"0123456789".to_vec());
        let entry = store.acquire("f", Some(fingerprint(&remote, "f"))).unwrap();
        let mut state = entry.lock();
        state.truncate(4).unwrap();
        state.truncate(6).unwrap();
        let mut buf = [0xffu8; 6];
        state.read_at(&remote, &stats, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"0123\0\0");
        state.upload(&remote, &stats).unwrap();
        drop(state);
        assert_eq!(remote.object("f").unwrap(), b"0123\0\0");
    }

    #[test]
    fn test_write_beyond_end_leaves_zero_hole() {
        let (_dir, store, remote, stats) = setup();
        let entry = store.acquire("new", None).unwrap();
        let mut state = entry.lock();
        state.write_at(4, b"z").unwrap();
        assert_eq!(state.size(), 5);
        let mut buf = [1u8; 5];
        state.read_at(&remote, &stats, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"\0\0\0\0z");
    }

    #[test]
    fn test_stale_clean_copy_is_discarded() {
        let (_dir, store, remote, stats) = setup();
        remote.insert_object("f", b"old".to_vec());
        let entry = store.acquire("f", Some(fingerprint(&remote, "f"))).unwrap();
        entry.lock().fetch_all(&remote, &stats).unwrap();
        store.release(&entry, true);

        std::thread::sleep(std::time::Duration::from_millis(5));
        remote.insert_object("f", b"newer".to_vec());
        let entry = store.acquire("f", Some(fingerprint(&remote, "f"))).unwrap();
        let mut buf = [0u8; 5];
        let n = entry.lock().read_at(&remote, &stats, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"newer");
    }

    #[test]
    fn test_release_purges_unless_retained() {
        let (dir, store, remote, _stats) = setup();
        remote.insert_object("a/f", b"x".to_vec());
        let entry = store.acquire("a/f", Some(fingerprint(&remote, "a/f"))).unwrap();
        store.release(&entry, true);
        assert_eq!(store.len(), 1);

        let entry = store.acquire("a/f", Some(fingerprint(&remote, "a/f"))).unwrap();
        store.release(&entry, false);
        assert!(store.is_empty());
        assert!(!dir.path().join("data/a/f").exists());
    }

    #[test]
    fn test_dirty_entry_survives_restart() {
        let dir = TempDir::new().unwrap();
        let remote = MemoryRemote::new();
        {
            let store = CacheStore::open(dir.path(), Arc::new(VfsStats::new())).unwrap();
            let entry = store.acquire("docs/draft.txt", None).unwrap();
            entry.lock().write_at(0, b"unsaved").unwrap();
            store.release(&entry, false);
            assert!(dir.path().join("meta/docs/draft.txt.json").exists());
        }

        let stats = Arc::new(VfsStats::new());
        let store = CacheStore::open(dir.path(), Arc::clone(&stats)).unwrap();
        let entry = store.get("docs/draft.txt").expect("re-adopted");
        assert!(entry.is_dirty());
        assert_eq!(entry.pins(), 0);
        entry.lock().upload(&remote, &stats).unwrap();
        assert_eq!(remote.object("docs/draft.txt").unwrap(), b"unsaved");
        assert!(!dir.path().join("meta/docs/draft.txt.json").exists());
    }

    #[test]
    fn test_orphaned_data_is_removed_on_open() {
        let dir = TempDir::new().unwrap();
        let orphan = dir.path().join("data/x/y.bin");
        fs::create_dir_all(orphan.parent().unwrap()).unwrap();
        fs::write(&orphan, b"junk").unwrap();
        let _store = CacheStore::open(dir.path(), Arc::new(VfsStats::new())).unwrap();
        assert!(!orphan.exists());
        assert!(!dir.path().join("data/x").exists());
    }

    #[test]
    fn test_rename_moves_data() {
        let (dir, store, _remote, _stats) = setup();
        let entry = store.acquire("d/a.txt", None).unwrap();
        entry.lock().write_at(0, b"abc").unwrap();
        store.rename("d", "e").unwrap();
        assert!(store.get("d/a.txt").is_none());
        let moved = store.get("e/a.txt").unwrap();
        assert!(Arc::ptr_eq(&moved, &entry));
        assert_eq!(moved.path(), "e/a.txt");
        assert!(dir.path().join("data/e/a.txt").exists());
        assert!(dir.path().join("meta/e/a.txt.json").exists());
        assert!(!dir.path().join("meta/d/a.txt.json").exists());
    }

    #[test]
    fn test_detach_stops_write_back() {
        let (_dir, store, _remote, _stats) = setup();
        let entry = store.acquire("f", None).unwrap();
        entry.lock().write_at(0, b"abc").unwrap();
        store.detach("f");
        assert!(!entry.is_dirty());
        assert!(entry.lock().is_detached());
        store.release(&entry, false);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clean_up_removes_everything() {
        let (dir, store, _remote, _stats) = setup();
        let entry = store.acquire("f", None).unwrap();
        entry.lock().write_at(0, b"abc").unwrap();
        store.clean_up().unwrap();
        assert!(!dir.path().exists());
        assert!(store.is_empty());
    }
}
