//! In-memory object store.
//!
//! [`MemoryRemote`] keeps objects in a `BTreeMap` behind a lock and counts
//! every call, which lets tests assert things like "the second reader did
//! not trigger a second download". It also supports fault injection for
//! commits, reads and listings.

use crate::path;
use crate::{Remote, RemoteEntry, RemoteError, RemoteResult, RemoteWriter};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::trace;

#[derive(Debug, Clone)]
struct Object {
    data: Arc<Vec<u8>>,
    mod_time: SystemTime,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, Object>,
    /// Explicit directories. Ancestors of objects are implicit directories.
    dirs: BTreeSet<String>,
}

impl State {
    fn is_dir(&self, dir: &str) -> bool {
        if dir.is_empty() || self.dirs.contains(dir) {
            return true;
        }
        let prefix = format!("{dir}/");
        self.objects
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
            || self
                .dirs
                .range(prefix.clone()..)
                .next()
                .is_some_and(|key| key.starts_with(&prefix))
    }

    fn add_ancestors(&mut self, p: &str) {
        let mut current = path::parent(p);
        while let Some(dir) = current {
            if dir.is_empty() {
                break;
            }
            self.dirs.insert(dir.to_string());
            current = path::parent(dir);
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    list_calls: AtomicU64,
    stat_calls: AtomicU64,
    read_calls: AtomicU64,
    read_bytes: AtomicU64,
    commits: AtomicU64,
    removes: AtomicU64,
}

#[derive(Debug, Default)]
struct Faults {
    commit_failures: AtomicU32,
    read_failures: AtomicU32,
    list_failure: AtomicBool,
}

/// Takes one pending failure from `counter`, returning true if one was armed.
fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<State>,
    counters: Counters,
    faults: Faults,
}

/// Snapshot of the call counters of a [`MemoryRemote`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteCounters {
    /// Number of `list` calls.
    pub list_calls: u64,
    /// Number of `stat` calls.
    pub stat_calls: u64,
    /// Number of `open_read` calls (each one is a GET).
    pub read_calls: u64,
    /// Bytes handed out by read streams.
    pub read_bytes: u64,
    /// Number of successful upload commits.
    pub commits: u64,
    /// Number of successful object removals.
    pub removes: u64,
}

/// An in-memory object store.
///
/// Cloning shares the underlying store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

impl MemoryRemote {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object directly, bypassing counters and faults.
    pub fn insert_object(&self, object_path: &str, data: impl Into<Vec<u8>>) {
        let object_path = path::normalize(object_path);
        let mut state = self.inner.state.write();
        state.add_ancestors(&object_path);
        state.objects.insert(
            object_path,
            Object {
                data: Arc::new(data.into()),
                mod_time: SystemTime::now(),
            },
        );
    }

    /// Returns a copy of an object's content, if present.
    pub fn object(&self, object_path: &str) -> Option<Vec<u8>> {
        let object_path = path::normalize(object_path);
        self.inner
            .state
            .read()
            .objects
            .get(&object_path)
            .map(|o| o.data.as_ref().clone())
    }

    /// Returns true if `dir_path` is a directory (explicit or implied).
    pub fn has_dir(&self, dir_path: &str) -> bool {
        self.inner.state.read().is_dir(&path::normalize(dir_path))
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.inner.state.read().objects.len()
    }

    /// Returns a snapshot of the call counters.
    pub fn counters(&self) -> RemoteCounters {
        let c = &self.inner.counters;
        RemoteCounters {
            list_calls: c.list_calls.load(Ordering::Relaxed),
            stat_calls: c.stat_calls.load(Ordering::Relaxed),
            read_calls: c.read_calls.load(Ordering::Relaxed),
            read_bytes: c.read_bytes.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
            removes: c.removes.load(Ordering::Relaxed),
        }
    }

    /// Resets every call counter to zero.
    pub fn reset_counters(&self) {
        let c = &self.inner.counters;
        c.list_calls.store(0, Ordering::Relaxed);
        c.stat_calls.store(0, Ordering::Relaxed);
        c.read_calls.store(0, Ordering::Relaxed);
        c.read_bytes.store(0, Ordering::Relaxed);
        c.commits.store(0, Ordering::Relaxed);
        c.removes.store(0, Ordering::Relaxed);
    }

    /// Makes the next `n` upload commits fail with a transient error.
    pub fn fail_next_commits(&self, n: u32) {
        self.inner.faults.commit_failures.store(n, Ordering::Release);
    }

    /// Makes the next `n` `open_read` calls fail with a transient error.
    pub fn fail_next_reads(&self, n: u32) {
        self.inner.faults.read_failures.store(n, Ordering::Release);
    }

    /// While set, every `list` call fails with a transient error.
    pub fn set_list_failure(&self, failing: bool) {
        self.inner
            .faults
            .list_failure
            .store(failing, Ordering::Release);
    }
}

impl Remote for MemoryRemote {
    fn name(&self) -> &str {
        "memory"
    }

    fn list(&self, dir: &str) -> RemoteResult<Vec<RemoteEntry>> {
        self.inner.counters.list_calls.fetch_add(1, Ordering::Relaxed);
        trace!(path = dir, "memory list");
        if self.inner.faults.list_failure.load(Ordering::Acquire) {
            return Err(RemoteError::transient(dir, "injected listing failure"));
        }

        let state = self.inner.state.read();
        if state.objects.contains_key(dir) {
            return Err(RemoteError::NotDirectory {
                path: dir.to_string(),
            });
        }
        if !state.is_dir(dir) {
            return Err(RemoteError::not_found(dir));
        }

        let mut files: BTreeMap<String, RemoteEntry> = BTreeMap::new();
        let mut subdirs: BTreeMap<String, SystemTime> = BTreeMap::new();
        for (key, object) in &state.objects {
            if !path::is_descendant(key, dir) {
                continue;
            }
            let rest = if dir.is_empty() {
                key.as_str()
            } else {
                &key[dir.len() + 1..]
            };
            match rest.split_once('/') {
                None => {
                    files.insert(
                        rest.to_string(),
                        RemoteEntry::file(rest, object.data.len() as u64, object.mod_time),
                    );
                }
                Some((child, _)) => {
                    let entry = subdirs.entry(child.to_string()).or_insert(object.mod_time);
                    *entry = (*entry).max(object.mod_time);
                }
            }
        }
        for key in &state.dirs {
            if !path::is_descendant(key, dir) {
                continue;
            }
            let rest = if dir.is_empty() {
                key.as_str()
            } else {
                &key[dir.len() + 1..]
            };
            let child = rest.split_once('/').map_or(rest, |(c, _)| c);
            subdirs
                .entry(child.to_string())
                .or_insert(SystemTime::UNIX_EPOCH);
        }

        let mut entries: Vec<RemoteEntry> = subdirs
            .into_iter()
            .map(|(name, mod_time)| RemoteEntry::dir(name, mod_time))
            .collect();
        entries.extend(files.into_values());
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, object_path: &str) -> RemoteResult<RemoteEntry> {
        self.inner.counters.stat_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.inner.state.read();
        if let Some(object) = state.objects.get(object_path) {
            return Ok(RemoteEntry::file(
                path::file_name(object_path),
                object.data.len() as u64,
                object.mod_time,
            ));
        }
        if state.is_dir(object_path) {
            return Ok(RemoteEntry::dir(
                path::file_name(object_path),
                SystemTime::UNIX_EPOCH,
            ));
        }
        Err(RemoteError::not_found(object_path))
    }

    fn open_read(&self, object_path: &str, offset: u64) -> RemoteResult<Box<dyn Read + Send>> {
        self.inner.counters.read_calls.fetch_add(1, Ordering::Relaxed);
        trace!(path = object_path, offset, "memory open_read");
        if take_fault(&self.inner.faults.read_failures) {
            return Err(RemoteError::transient(object_path, "injected read failure"));
        }
        let state = self.inner.state.read();
        let Some(object) = state.objects.get(object_path) else {
            if state.is_dir(object_path) {
                return Err(RemoteError::IsDirectory {
                    path: object_path.to_string(),
                });
            }
            return Err(RemoteError::not_found(object_path));
        };
        let pos = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(object.data.len());
        Ok(Box::new(MemoryReader {
            data: Arc::clone(&object.data),
            pos,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn open_write(&self, object_path: &str) -> RemoteResult<Box<dyn RemoteWriter>> {
        trace!(path = object_path, "memory open_write");
        if object_path.is_empty() || self.inner.state.read().is_dir(object_path) {
            return Err(RemoteError::IsDirectory {
                path: object_path.to_string(),
            });
        }
        Ok(Box::new(MemoryWriter {
            path: object_path.to_string(),
            buf: Vec::new(),
            inner: Arc::clone(&self.inner),
        }))
    }

    fn remove(&self, object_path: &str) -> RemoteResult<()> {
        let mut state = self.inner.state.write();
        if state.objects.remove(object_path).is_some() {
            self.inner.counters.removes.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        if state.is_dir(object_path) {
            return Err(RemoteError::IsDirectory {
                path: object_path.to_string(),
            });
        }
        Err(RemoteError::not_found(object_path))
    }

    fn mkdir(&self, dir: &str) -> RemoteResult<()> {
        let mut state = self.inner.state.write();
        if state.objects.contains_key(dir) || state.is_dir(dir) {
            return Err(RemoteError::AlreadyExists {
                path: dir.to_string(),
            });
        }
        state.add_ancestors(dir);
        state.dirs.insert(dir.to_string());
        Ok(())
    }

    fn rmdir(&self, dir: &str) -> RemoteResult<()> {
        let mut state = self.inner.state.write();
        if state.objects.contains_key(dir) {
            return Err(RemoteError::NotDirectory {
                path: dir.to_string(),
            });
        }
        if dir.is_empty() || !state.is_dir(dir) {
            return Err(RemoteError::not_found(dir));
        }
        let has_children = state.objects.keys().any(|k| path::is_descendant(k, dir))
            || state.dirs.iter().any(|k| path::is_descendant(k, dir));
        if has_children {
            return Err(RemoteError::NotEmpty {
                path: dir.to_string(),
            });
        }
        state.dirs.remove(dir);
        Ok(())
    }

    fn rename(&self, src: &str, dst: &str) -> RemoteResult<()> {
        trace!(src, dst, "memory rename");
        let mut state = self.inner.state.write();
        if let Some(object) = state.objects.remove(src) {
            state.add_ancestors(dst);
            state.objects.insert(dst.to_string(), object);
            return Ok(());
        }
        if src.is_empty() || !state.is_dir(src) {
            return Err(RemoteError::not_found(src));
        }
        if state.objects.contains_key(dst) {
            return Err(RemoteError::AlreadyExists {
                path: dst.to_string(),
            });
        }

        let moved_objects: Vec<String> = state
            .objects
            .keys()
            .filter(|k| path::is_descendant(k, src))
            .cloned()
            .collect();
        for key in moved_objects {
            if let Some(object) = state.objects.remove(&key) {
                state.objects.insert(path::rebase(&key, src, dst), object);
            }
        }
        let moved_dirs: Vec<String> = state
            .dirs
            .iter()
            .filter(|k| k.as_str() == src || path::is_descendant(k, src))
            .cloned()
            .collect();
        for key in moved_dirs {
            state.dirs.remove(&key);
            state.dirs.insert(path::rebase(&key, src, dst));
        }
        state.add_ancestors(dst);
        state.dirs.insert(dst.to_string());
        Ok(())
    }
}

struct MemoryReader {
    data: Arc<Vec<u8>>,
    pos: usize,
    inner: Arc<Inner>,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        self.inner
            .counters
            .read_bytes
            .fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

struct MemoryWriter {
    path: String,
    buf: Vec<u8>,
    inner: Arc<Inner>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl RemoteWriter for MemoryWriter {
    fn commit(self: Box<Self>) -> RemoteResult<RemoteEntry> {
        if take_fault(&self.inner.faults.commit_failures) {
            return Err(RemoteError::transient(&self.path, "injected upload failure"));
        }
        let mod_time = SystemTime::now();
        let size = self.buf.len() as u64;
        let mut state = self.inner.state.write();
        state.add_ancestors(&self.path);
        state.objects.insert(
            self.path.clone(),
            Object {
                data: Arc::new(self.buf),
                mod_time,
            },
        );
        self.inner.counters.commits.fetch_add(1, Ordering::Relaxed);
        trace!(path = %self.path, size, "memory commit");
        Ok(RemoteEntry::file(path::file_name(&self.path), size, mod_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(remote: &MemoryRemote, p: &str, data: &[u8]) -> RemoteEntry {
        let mut w = remote.open_write(p).unwrap();
        w.write_all(data).unwrap();
        w.commit().unwrap()
    }

    fn read_all(remote: &MemoryRemote, p: &str, offset: u64) -> Vec<u8> {
        let mut out = Vec::new();
        remote
            .open_read(p, offset)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_write_then_read() {
        let remote = MemoryRemote::new();
        let entry = write(&remote, "a/b.txt", b"hello");
        assert_eq!(entry.size, 5);
        assert_eq!(entry.name, "b.txt");
        assert_eq!(read_all(&remote, "a/b.txt", 0), b"hello");
        assert_eq!(read_all(&remote, "a/b.txt", 3), b"lo");
        assert_eq!(read_all(&remote, "a/b.txt", 99), b"");
    }

    #[test]
    fn test_uncommitted_writer_is_invisible() {
        let remote = MemoryRemote::new();
        let mut w = remote.open_write("x").unwrap();
        w.write_all(b"data").unwrap();
        assert!(remote.object("x").is_none());
        w.abort();
        assert!(remote.object("x").is_none());
    }

    #[test]
    fn test_list_mixes_files_and_dirs() {
        let remote = MemoryRemote::new();
        remote.insert_object("a/b.txt", b"12".to_vec());
        remote.insert_object("a/sub/c.txt", b"3".to_vec());
        remote.mkdir("a/empty").unwrap();

        let names: Vec<_> = remote
            .list("a")
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();
        assert_eq!(
            names,
            vec![
                ("b.txt".to_string(), false),
                ("empty".to_string(), true),
                ("sub".to_string(), true),
            ]
        );

        let root = remote.list("").unwrap();
        assert_eq!(root.len(), 1);
        assert!(root[0].is_dir);
    }

    #[test]
    fn test_list_errors() {
        let remote = MemoryRemote::new();
        remote.insert_object("f", b"x".to_vec());
        assert!(remote.list("missing").unwrap_err().is_not_found());
        assert!(matches!(
            remote.list("f").unwrap_err(),
            RemoteError::NotDirectory { .. }
        ));
    }

    #[test]
    fn test_rmdir_not_empty() {
        let remote = MemoryRemote::new();
        remote.insert_object("d/f", b"x".to_vec());
        assert!(matches!(
            remote.rmdir("d").unwrap_err(),
            RemoteError::NotEmpty { .. }
        ));
        remote.remove("d/f").unwrap();
        // Ancestors created by a write persist like real directories.
        assert!(remote.has_dir("d"));
        remote.rmdir("d").unwrap();
        assert!(!remote.has_dir("d"));
    }

    #[test]
    fn test_rename_directory_tree() {
        let remote = MemoryRemote::new();
        remote.insert_object("src/a.txt", b"a".to_vec());
        remote.insert_object("src/deep/b.txt", b"b".to_vec());
        remote.rename("src", "dst").unwrap();
        assert!(remote.object("src/a.txt").is_none());
        assert_eq!(remote.object("dst/a.txt").unwrap(), b"a");
        assert_eq!(remote.object("dst/deep/b.txt").unwrap(), b"b");
        assert!(!remote.has_dir("src"));
    }

    #[test]
    fn test_counters() {
        let remote = MemoryRemote::new();
        write(&remote, "f", b"abcdef");
        let _ = read_all(&remote, "f", 2);
        let _ = remote.list("").unwrap();
        let counters = remote.counters();
        assert_eq!(counters.commits, 1);
        assert_eq!(counters.read_calls, 1);
        assert_eq!(counters.read_bytes, 4);
        assert_eq!(counters.list_calls, 1);

        remote.reset_counters();
        assert_eq!(remote.counters(), RemoteCounters::default());
    }

    #[test]
    fn test_fault_injection() {
        let remote = MemoryRemote::new();
        remote.fail_next_commits(1);
        let mut w = remote.open_write("f").unwrap();
        w.write_all(b"x").unwrap();
        assert!(w.commit().unwrap_err().is_transient());
        assert!(remote.object("f").is_none());
        // Only one failure was armed.
        write(&remote, "f", b"x");

        remote.fail_next_reads(1);
        assert!(remote.open_read("f", 0).is_err());
        assert!(remote.open_read("f", 0).is_ok());

        remote.set_list_failure(true);
        assert!(remote.list("").unwrap_err().is_transient());
        remote.set_list_failure(false);
        assert!(remote.list("").is_ok());
    }

    #[test]
    fn test_remove_errors() {
        let remote = MemoryRemote::new();
        remote.mkdir("d").unwrap();
        assert!(matches!(
            remote.remove("d").unwrap_err(),
            RemoteError::IsDirectory { .. }
        ));
        assert!(remote.remove("nope").unwrap_err().is_not_found());
        assert!(matches!(
            remote.mkdir("d").unwrap_err(),
            RemoteError::AlreadyExists { .. }
        ));
    }
}
