//! File nodes for files with open handles.
//!
//! A [`FileNode`] exists while at least one handle targets its path. It
//! carries the size and modification time handles should report, the
//! single-writer slot, and the deferred-deletion flag. Nodes are owned by
//! the [`NodeTable`] arena keyed by path; handles hold an `Arc` so a node
//! can be detached (deleted or renamed away) while still in use.

use crate::error::{VfsError, VfsResult};
use crate::policy::HandleKind;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use objvfs_remote::{RemoteEntry, path};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::SystemTime;
use tracing::trace;

/// Size and modification time as last observed or locally changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// File size in bytes.
    pub size: u64,
    /// Last modification time.
    pub mod_time: SystemTime,
    /// Whether the object exists remotely yet.
    pub exists_remotely: bool,
}

impl FileMeta {
    /// Metadata of a file that exists only locally so far.
    pub fn new_local() -> Self {
        Self {
            size: 0,
            mod_time: SystemTime::now(),
            exists_remotely: false,
        }
    }
}

impl From<&RemoteEntry> for FileMeta {
    fn from(entry: &RemoteEntry) -> Self {
        Self {
            size: entry.size,
            mod_time: entry.mod_time,
            exists_remotely: true,
        }
    }
}

/// One remote object with open handles.
#[derive(Debug)]
pub struct FileNode {
    path: RwLock<String>,
    meta: Mutex<FileMeta>,
    open_count: AtomicU32,
    writer: Mutex<Option<HandleKind>>,
    dirty: AtomicBool,
    deleted: AtomicBool,
}

impl FileNode {
    fn new(path: &str, meta: FileMeta, writer: Option<HandleKind>) -> Self {
        Self {
            path: RwLock::new(path.to_string()),
            meta: Mutex::new(meta),
            open_count: AtomicU32::new(1),
            writer: Mutex::new(writer),
            dirty: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
        }
    }

    /// Current path. Changes on rename.
    pub fn path(&self) -> String {
        self.path.read().clone()
    }

    /// Current metadata.
    pub fn meta(&self) -> FileMeta {
        *self.meta.lock()
    }

    /// Replaces the metadata after a successful write-back.
    pub fn set_meta(&self, meta: FileMeta) {
        *self.meta.lock() = meta;
        self.dirty.store(false, Ordering::Release);
    }

    /// Records a local size change.
    pub fn set_size(&self, size: u64) {
        let mut meta = self.meta.lock();
        meta.size = size;
        meta.mod_time = SystemTime::now();
    }

    /// Number of open handles.
    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::Acquire)
    }

    /// Variant of the open writer, if any.
    pub fn writer(&self) -> Option<HandleKind> {
        *self.writer.lock()
    }

    /// Whether content differs from the remote.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether the file was removed while open.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }
}

/// Arena of [`FileNode`]s for files with open handles.
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: DashMap<String, Arc<FileNode>>,
}

impl NodeTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one more handle on `file_path`.
    ///
    /// `meta` is only used when no node exists yet. A writer is refused with
    /// [`VfsError::Busy`] if the node already has one.
    pub fn open(
        &self,
        file_path: &str,
        meta: FileMeta,
        writer: Option<HandleKind>,
    ) -> VfsResult<Arc<FileNode>> {
        match self.nodes.entry(file_path.to_string()) {
            Entry::Occupied(occupied) => {
                let node = occupied.get();
                if writer.is_some() {
                    let mut slot = node.writer.lock();
                    if slot.is_some() {
                        return Err(VfsError::Busy(file_path.to_string()));
                    }
                    *slot = writer;
                }
                node.open_count.fetch_add(1, Ordering::AcqRel);
                Ok(Arc::clone(node))
            }
            Entry::Vacant(vacant) => {
                trace!(path = file_path, "file node created");
                let node = Arc::new(FileNode::new(file_path, meta, writer));
                vacant.insert(Arc::clone(&node));
                Ok(node)
            }
        }
    }

    /// Releases one handle on `node`, dropping the node with the last one.
    pub fn close(&self, node: &Arc<FileNode>, was_writer: bool) {
        if was_writer {
            *node.writer.lock() = None;
        }
        match self.nodes.entry(node.path()) {
            Entry::Occupied(occupied) if Arc::ptr_eq(occupied.get(), node) => {
                if node.open_count.fetch_sub(1, Ordering::AcqRel) == 1 {
                    trace!(path = %occupied.key(), "file node released");
                    occupied.remove();
                }
            }
            _ => {
                // Detached by remove or rename; nothing indexes it any more.
                node.open_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }

    /// Looks up the node for `file_path`.
    pub fn get(&self, file_path: &str) -> Option<Arc<FileNode>> {
        self.nodes.get(file_path).map(|n| Arc::clone(n.value()))
    }

    /// Unlinks the node for a deleted path. Its handles keep working locally.
    pub fn detach(&self, file_path: &str) -> Option<Arc<FileNode>> {
        let (_, node) = self.nodes.remove(file_path)?;
        node.deleted.store(true, Ordering::Release);
        Some(node)
    }

    /// Re-keys nodes at or below `src` to live under `dst`.
    pub fn rename(&self, src: &str, dst: &str) {
        let moved: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.key() == src || path::is_descendant(n.key(), src))
            .map(|n| n.key().clone())
            .collect();
        for old in moved {
            let new_path = path::rebase(&old, src, dst);
            self.detach(&new_path);
            if let Some((_, node)) = self.nodes.remove(&old) {
                *node.path.write() = new_path.clone();
                self.nodes.insert(new_path, node);
            }
        }
    }

    /// Returns true if any node lives at or below `dir`.
    pub fn has_open_below(&self, dir: &str) -> bool {
        self.nodes
            .iter()
            .any(|n| n.key() == dir || path::is_descendant(n.key(), dir))
    }

    /// Every indexed node.
    pub fn nodes(&self) -> Vec<Arc<FileNode>> {
        self.nodes.iter().map(|n| Arc::clone(n.value())).collect()
    }

    /// Number of indexed nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no file is open.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_shares_node() {
        let table = NodeTable::new();
        let a = table.open("f", FileMeta::new_local(), None).unwrap();
        let b = table.open("f", FileMeta::new_local(), None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.open_count(), 2);

        table.close(&a, false);
        assert_eq!(table.len(), 1);
        table.close(&b, false);
        assert!(table.is_empty());
    }

    #[test]
    fn test_second_writer_is_busy() {
        let table = NodeTable::new();
        let w = table
            .open("f", FileMeta::new_local(), Some(HandleKind::BufferedWrite))
            .unwrap();
        let err = table
            .open("f", FileMeta::new_local(), Some(HandleKind::DirectWrite))
            .unwrap_err();
        assert!(matches!(err, VfsError::Busy(_)));
        // Readers are still welcome.
        table.open("f", FileMeta::new_local(), None).unwrap();

        table.close(&w, true);
        table
            .open("f", FileMeta::new_local(), Some(HandleKind::DirectWrite))
            .unwrap();
    }

    #[test]
    fn test_detach_marks_deleted() {
        let table = NodeTable::new();
        let node = table.open("f", FileMeta::new_local(), None).unwrap();
        table.detach("f").unwrap();
        assert!(node.is_deleted());
        assert!(table.get("f").is_none());

        // A new file at the same path gets a fresh node.
        let fresh = table.open("f", FileMeta::new_local(), None).unwrap();
        assert!(!Arc::ptr_eq(&fresh, &node));
        table.close(&node, false);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rename_rekeys_descendants() {
        let table = NodeTable::new();
        let node = table.open("d/a", FileMeta::new_local(), None).unwrap();
        table.rename("d", "e");
        assert_eq!(node.path(), "e/a");
        assert!(table.get("d/a").is_none());
        assert!(table.has_open_below("e"));
        table.close(&node, false);
        assert!(table.is_empty());
    }
}
