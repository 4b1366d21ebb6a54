//! Thread-safe table of open file handles.
//!
//! Handle IDs are auto-incrementing `u64`s starting at 1; 0 is reserved as
//! the invalid handle, matching what mount front-ends expect for `fh`.
//!
//! # Handle Lifecycle
//!
//! 1. **Insert**: `open` stores the handle and returns its ID
//! 2. **Get**: each operation clones the stored value out (values are
//!    cheap shared pointers) so no map shard stays locked during I/O
//! 3. **Remove**: `close` takes the handle out before tearing it down

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

/// Concurrent map from handle IDs to handle values.
///
/// ```
/// use objvfs::HandleTable;
///
/// let table: HandleTable<String> = HandleTable::new();
///
/// let id1 = table.insert("file1".to_string());
/// let id2 = table.insert("file2".to_string());
///
/// assert_ne!(id1, id2);
/// assert_eq!(table.len(), 2);
///
/// assert_eq!(table.remove(id1), Some("file1".to_string()));
/// ```
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: DashMap<u64, V>,
    /// Next ID to hand out (starts at 1, 0 reserved for invalid).
    next_id: AtomicU64,
}

impl<V> HandleTable<V> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts a value under a fresh ID and returns the ID.
    pub fn insert(&self, value: V) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                // Wrapped around.
                continue;
            }
            if let Entry::Vacant(entry) = self.handles.entry(id) {
                entry.insert(value);
                return id;
            }
        }
    }

    /// Removes a handle and returns it.
    pub fn remove(&self, id: u64) -> Option<V> {
        self.handles.remove(&id).map(|(_, v)| v)
    }

    /// Checks if a handle exists.
    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Checks if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// IDs of every open handle.
    pub fn ids(&self) -> Vec<u64> {
        self.handles.iter().map(|e| *e.key()).collect()
    }
}

impl<V: Clone> HandleTable<V> {
    /// Clones the value stored under `id`.
    pub fn get(&self, id: u64) -> Option<V> {
        self.handles.get(&id).map(|v| v.value().clone())
    }
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let table: HandleTable<String> = HandleTable::new();

        assert_eq!(table.insert("file1".to_string()), 1);
        assert_eq!(table.insert("file2".to_string()), 2);
        assert_eq!(table.insert("file3".to_string()), 3);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_get_clones_value() {
        let table: HandleTable<Arc<String>> = HandleTable::new();
        let id = table.insert(Arc::new("hello".to_string()));

        let handle = table.get(id).expect("Should exist");
        assert_eq!(*handle, "hello");
        assert_eq!(Arc::strong_count(&handle), 2);
    }

    #[test]
    fn test_remove() {
        let table: HandleTable<String> = HandleTable::new();
        let id = table.insert("hello".to_string());

        assert!(table.contains(id));
        assert_eq!(table.remove(id), Some("hello".to_string()));
        assert!(!table.contains(id));
        assert!(table.is_empty());
        assert!(table.remove(id).is_none());
    }

    #[test]
    fn test_id_zero_never_returned() {
        let table: HandleTable<&str> = HandleTable::new();
        for _ in 0..1000 {
            assert_ne!(table.insert("value"), 0);
        }
    }

    #[test]
    fn test_id_overflow_guarded() {
        // Force the counter to wrap and ensure we never return 0 or overwrite.
        let mut table: HandleTable<&str> = HandleTable::new();
        let first = table.insert("first");
        assert_eq!(first, 1);
        table.next_id = AtomicU64::new(u64::MAX);

        assert_eq!(table.insert("max"), u64::MAX);
        let after = table.insert("after");
        assert_eq!(after, 2);
        assert_eq!(table.get(1), Some("first"));
    }

    #[test]
    fn test_ids_lists_open_handles() {
        let table: HandleTable<u8> = HandleTable::new();
        let a = table.insert(1);
        let b = table.insert(2);
        table.remove(a);
        assert_eq!(table.ids(), vec![b]);
    }

    #[test]
    fn test_concurrent_insert_remove_stress() {
        let table = Arc::new(HandleTable::<i32>::new());
        let mut handles = vec![];

        for i in 0..5 {
            let t = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    t.insert(i * 100 + j);
                }
            }));
        }
        for _ in 0..5 {
            let t = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for id in 1..=100 {
                    t.remove(id);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(table.len() <= 500);
    }

    #[test]
    fn test_concurrent_inserts_are_unique() {
        let table = Arc::new(HandleTable::<i32>::new());
        let workers: Vec<_> = (0..10)
            .map(|i| {
                let t = Arc::clone(&table);
                thread::spawn(move || (0..10).map(|j| t.insert(i * 10 + j)).collect::<Vec<_>>())
            })
            .collect();
        let mut ids: Vec<u64> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 100);
        assert_eq!(table.len(), 100);
    }
}
