//! In-memory mirror of remote directory listings.
//!
//! Directory nodes live in an arena keyed by path. Each node remembers the
//! last remote listing and when it was taken, plus an overlay of local
//! mutations (creates, deletes, renames) that the remote may not reflect
//! yet. A refresh replaces the listing and re-applies the overlay on top, so
//! a local create or delete is never lost to a racing refresh. Overlay
//! entries are dropped once a listing agrees with them.
//!
//! Staleness comes from three places: the TTL, [`DirTree::invalidate`] after
//! local mutations, and [`DirTree::flush_all`] from the external flush
//! trigger. None of them block readers; they only make the next lookup
//! re-list.

use crate::error::{VfsError, VfsResult};
use crate::stats::VfsStats;
use dashmap::DashMap;
use objvfs_remote::{Remote, RemoteEntry, path};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
enum Pending {
    Present(RemoteEntry),
    Absent,
}

#[derive(Debug, Default)]
struct DirState {
    children: BTreeMap<String, RemoteEntry>,
    refreshed: Option<Instant>,
    pending: BTreeMap<String, Pending>,
}

impl DirState {
    fn merge_listing(&mut self, entries: Vec<RemoteEntry>) {
        let mut children: BTreeMap<String, RemoteEntry> = entries
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();
        self.pending.retain(|name, pending| match pending {
            Pending::Present(local) => {
                if children
                    .get(name)
                    .is_some_and(|remote| remote.is_dir == local.is_dir)
                {
                    false
                } else {
                    children.insert(name.clone(), local.clone());
                    true
                }
            }
            Pending::Absent => children.remove(name).is_some(),
        });
        self.children = children;
        self.refreshed = Some(Instant::now());
    }
}

/// One cached remote directory.
#[derive(Debug)]
pub struct DirNode {
    path: String,
    stale: AtomicBool,
    /// Serializes refreshes so concurrent lookups share one listing.
    refresh: Mutex<()>,
    state: RwLock<DirState>,
}

impl DirNode {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            stale: AtomicBool::new(false),
            refresh: Mutex::new(()),
            state: RwLock::new(DirState::default()),
        }
    }

    /// Directory path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        !self.stale.load(Ordering::Acquire)
            && self
                .state
                .read()
                .refreshed
                .is_some_and(|at| at.elapsed() < ttl)
    }

    fn has_listing(&self) -> bool {
        self.state.read().refreshed.is_some()
    }

    fn child(&self, name: &str) -> Option<RemoteEntry> {
        self.state.read().children.get(name).cloned()
    }

    fn children(&self) -> Vec<RemoteEntry> {
        self.state.read().children.values().cloned().collect()
    }

    fn upsert(&self, entry: RemoteEntry) {
        let mut state = self.state.write();
        state
            .pending
            .insert(entry.name.clone(), Pending::Present(entry.clone()));
        state.children.insert(entry.name.clone(), entry);
    }

    fn remove(&self, name: &str) {
        let mut state = self.state.write();
        state.pending.insert(name.to_string(), Pending::Absent);
        state.children.remove(name);
    }
}

/// The directory tree cache.
#[derive(Debug)]
pub struct DirTree {
    remote: Arc<dyn Remote>,
    ttl: Duration,
    nodes: DashMap<String, Arc<DirNode>>,
    stats: Arc<VfsStats>,
}

impl DirTree {
    /// Creates an empty tree whose listings are trusted for `ttl`.
    pub fn new(remote: Arc<dyn Remote>, ttl: Duration, stats: Arc<VfsStats>) -> Self {
        Self {
            remote,
            ttl,
            nodes: DashMap::new(),
            stats,
        }
    }

    fn node(&self, dir: &str) -> Arc<DirNode> {
        if let Some(node) = self.nodes.get(dir) {
            return Arc::clone(node.value());
        }
        Arc::clone(
            self.nodes
                .entry(dir.to_string())
                .or_insert_with(|| Arc::new(DirNode::new(dir)))
                .value(),
        )
    }

    /// Re-lists `node` if its listing is missing, expired or invalidated.
    fn ensure_fresh(&self, node: &DirNode) -> VfsResult<()> {
        if node.is_fresh(self.ttl) {
            self.stats.dir_cache().record_hit();
            return Ok(());
        }
        let _refresh = node.refresh.lock();
        if node.is_fresh(self.ttl) {
            // Another thread refreshed while we waited.
            self.stats.dir_cache().record_hit();
            return Ok(());
        }
        self.stats.dir_cache().record_miss();
        self.stats.record_list();

        // Cleared before listing so a flush that lands mid-listing sticks.
        node.stale.store(false, Ordering::Release);
        match self.remote.list(&node.path) {
            Ok(entries) => {
                trace!(path = %node.path, count = entries.len(), "directory listed");
                node.state.write().merge_listing(entries);
                Ok(())
            }
            Err(e) if e.is_transient() && node.has_listing() => {
                node.stale.store(true, Ordering::Release);
                self.stats.dir_cache().record_stale_served();
                warn!(path = %node.path, error = %e, "listing failed, serving stale entries");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %node.path, "directory vanished remotely");
                self.forget(&node.path);
                Err(VfsError::NotFound(node.path.clone()))
            }
            Err(e) => {
                node.stale.store(true, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Resolves `target` to its entry, refreshing stale directories on the way.
    pub fn lookup(&self, target: &str) -> VfsResult<RemoteEntry> {
        if target.is_empty() {
            return Ok(RemoteEntry::dir("", SystemTime::UNIX_EPOCH));
        }
        let segments: Vec<&str> = path::segments(target).collect();
        let mut dir = String::new();
        for (i, segment) in segments.iter().enumerate() {
            let node = self.node(&dir);
            self.ensure_fresh(&node).map_err(|e| match e {
                VfsError::NotFound(_) => VfsError::NotFound(target.to_string()),
                other => other,
            })?;
            let child = node
                .child(segment)
                .ok_or_else(|| VfsError::NotFound(target.to_string()))?;
            if i + 1 == segments.len() {
                return Ok(child);
            }
            if !child.is_dir {
                return Err(VfsError::NotDirectory(target.to_string()));
            }
            dir = path::join(&dir, segment);
        }
        Err(VfsError::NotFound(target.to_string()))
    }

    /// Lists a directory's children in name order.
    pub fn readdir(&self, dir: &str) -> VfsResult<Vec<RemoteEntry>> {
        let entry = self.lookup(dir)?;
        if !entry.is_dir {
            return Err(VfsError::NotDirectory(dir.to_string()));
        }
        let node = self.node(dir);
        self.ensure_fresh(&node)?;
        Ok(node.children())
    }

    /// Marks the directory at `dir` (only that node) for re-listing.
    pub fn invalidate(&self, dir: &str) {
        if let Some(node) = self.nodes.get(dir) {
            trace!(path = dir, "directory invalidated");
            node.stale.store(true, Ordering::Release);
        }
    }

    /// Marks every cached directory stale. Idempotent.
    pub fn flush_all(&self) {
        let mut count = 0usize;
        for node in &self.nodes {
            node.stale.store(true, Ordering::Release);
            count += 1;
        }
        self.stats.dir_cache().record_flush();
        debug!(directories = count, "directory cache flushed");
    }

    /// Records a locally created or updated child of `dir`.
    pub fn add_entry(&self, dir: &str, entry: RemoteEntry) {
        self.node(dir).upsert(entry);
    }

    /// Records a locally removed child of `dir`.
    pub fn remove_entry(&self, dir: &str, name: &str) {
        self.node(dir).remove(name);
        self.forget(&path::join(dir, name));
    }

    /// Seeds a freshly created directory with an empty listing.
    pub fn seed_empty(&self, dir: &str) {
        let node = self.node(dir);
        let mut state = node.state.write();
        state.children.clear();
        state.pending.clear();
        state.refreshed = Some(Instant::now());
    }

    /// Moves an entry and any cached directories below it.
    pub fn rename_entry(&self, src: &str, dst: &str, entry: RemoteEntry) {
        let (src_dir, src_name) = path::split(src);
        let (dst_dir, dst_name) = path::split(dst);
        let is_dir = entry.is_dir;
        self.node(src_dir).remove(src_name);
        self.node(dst_dir).upsert(RemoteEntry {
            name: dst_name.to_string(),
            ..entry
        });

        if is_dir {
            let moved: Vec<String> = self
                .nodes
                .iter()
                .filter(|n| n.key() == src || path::is_descendant(n.key(), src))
                .map(|n| n.key().clone())
                .collect();
            for old in moved {
                if let Some((_, node)) = self.nodes.remove(&old) {
                    let new_path = path::rebase(&old, src, dst);
                    let rebased = DirNode::new(&new_path);
                    *rebased.state.write() = std::mem::take(&mut *node.state.write());
                    rebased.stale.store(true, Ordering::Release);
                    self.nodes.insert(new_path, Arc::new(rebased));
                }
            }
        }
    }

    /// Drops the cached subtree rooted at `dir`.
    pub fn forget(&self, dir: &str) {
        if dir.is_empty() {
            return;
        }
        self.nodes
            .retain(|key, _| key != dir && !path::is_descendant(key, dir));
    }

    /// Number of cached directory nodes.
    pub fn cached_dirs(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if `dir` is cached with a listing that is still fresh.
    pub fn is_fresh(&self, dir: &str) -> bool {
        self.nodes
            .get(dir)
            .is_some_and(|node| node.is_fresh(self.ttl))
    }
}
