//! Statistics for a running engine.
//!
//! All counters are lock-free atomics updated with relaxed ordering, so
//! readers may see slightly stale values. [`VfsStats::snapshot`] produces a
//! serializable copy for reporting.
//!
//! ```
//! use objvfs::stats::VfsStats;
//!
//! let stats = VfsStats::new();
//! stats.record_download(4096);
//! stats.dir_cache().record_hit();
//! stats.dir_cache().record_miss();
//!
//! let snap = stats.snapshot();
//! assert_eq!(snap.downloads, 1);
//! assert!((snap.dir_cache.hit_rate() - 0.5).abs() < f64::EPSILON);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// Hit/miss accounting for the directory tree cache.
#[derive(Debug, Default)]
pub struct DirCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    flushes: AtomicU64,
    stale_served: AtomicU64,
}

impl DirCacheStats {
    /// Lookup answered from a fresh listing.
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookup that needed a remote listing.
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Whole-tree flush.
    #[inline]
    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Stale listing served because the remote was unreachable.
    #[inline]
    pub fn record_stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Creates a snapshot of current values.
    pub fn snapshot(&self) -> DirCacheSnapshot {
        DirCacheSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
        }
    }
}

/// A serializable snapshot of directory cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirCacheSnapshot {
    /// Lookups served from a fresh listing.
    pub hits: u64,
    /// Lookups that triggered a remote listing.
    pub misses: u64,
    /// Whole-tree flushes.
    pub flushes: u64,
    /// Stale listings served after a transient listing failure.
    pub stale_served: u64,
}

impl DirCacheSnapshot {
    /// Hit rate as a fraction (0.0 to 1.0); 0.0 with no lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Total/count pair for average latency.
#[derive(Debug, Default)]
pub struct LatencyStats {
    total_nanos: AtomicU64,
    count: AtomicU64,
}

impl LatencyStats {
    /// Records one operation.
    #[inline]
    pub fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of recorded operations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Average latency in milliseconds (0.0 when empty).
    pub fn avg_millis(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_nanos.load(Ordering::Relaxed) as f64 / count as f64 / 1_000_000.0
    }
}

/// Engine-wide counters.
#[derive(Debug)]
pub struct VfsStats {
    // Remote traffic
    remote_lists: AtomicU64,
    downloads: AtomicU64,
    bytes_downloaded: AtomicU64,
    uploads: AtomicU64,
    bytes_uploaded: AtomicU64,
    write_back_failures: AtomicU64,

    // Cache store
    purges: AtomicU64,
    dir_cache: DirCacheStats,

    // Caller traffic
    open_handles: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,

    upload_latency: LatencyStats,
    session_start: SystemTime,
}

impl Default for VfsStats {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self {
            remote_lists: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            uploads: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
            write_back_failures: AtomicU64::new(0),
            purges: AtomicU64::new(0),
            dir_cache: DirCacheStats::default(),
            open_handles: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            upload_latency: LatencyStats::default(),
            session_start: SystemTime::now(),
        }
    }

    /// A remote directory listing.
    #[inline]
    pub fn record_list(&self) {
        self.remote_lists.fetch_add(1, Ordering::Relaxed);
    }

    /// A remote read into the cache or through a direct handle.
    #[inline]
    pub fn record_download(&self, bytes: u64) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// A completed upload.
    #[inline]
    pub fn record_upload(&self, bytes: u64, elapsed: Duration) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
        self.upload_latency.record(elapsed);
    }

    /// A failed write-back.
    #[inline]
    pub fn record_write_back_failure(&self) {
        self.write_back_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A cache entry removed from disk.
    #[inline]
    pub fn record_purge(&self) {
        self.purges.fetch_add(1, Ordering::Relaxed);
    }

    /// A handle was opened.
    #[inline]
    pub fn record_open(&self) {
        self.open_handles.fetch_add(1, Ordering::Relaxed);
    }

    /// A handle was closed.
    #[inline]
    pub fn record_close(&self) {
        let _ = self
            .open_handles
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Bytes returned to a caller's read.
    #[inline]
    pub fn record_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes accepted from a caller's write.
    #[inline]
    pub fn record_write(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Directory cache counters.
    pub fn dir_cache(&self) -> &DirCacheStats {
        &self.dir_cache
    }

    /// Number of completed downloads.
    pub fn download_count(&self) -> u64 {
        self.downloads.load(Ordering::Relaxed)
    }

    /// Number of completed uploads.
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Number of currently open handles.
    pub fn open_handle_count(&self) -> u64 {
        self.open_handles.load(Ordering::Relaxed)
    }

    /// Creates a snapshot of current statistics.
    pub fn snapshot(&self) -> VfsStatsSnapshot {
        VfsStatsSnapshot {
            remote_lists: self.remote_lists.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            write_back_failures: self.write_back_failures.load(Ordering::Relaxed),
            purges: self.purges.load(Ordering::Relaxed),
            dir_cache: self.dir_cache.snapshot(),
            open_handles: self.open_handles.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            upload_latency_avg_ms: self.upload_latency.avg_millis(),
            session_start: self.session_start,
        }
    }
}

/// A serializable snapshot of engine statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VfsStatsSnapshot {
    /// Remote directory listings performed.
    pub remote_lists: u64,
    /// Remote reads performed.
    pub downloads: u64,
    /// Bytes fetched from the remote.
    pub bytes_downloaded: u64,
    /// Uploads committed.
    pub uploads: u64,
    /// Bytes uploaded.
    pub bytes_uploaded: u64,
    /// Failed write-backs.
    pub write_back_failures: u64,
    /// Cache entries purged.
    pub purges: u64,
    /// Directory cache counters.
    pub dir_cache: DirCacheSnapshot,
    /// Handles open when the snapshot was taken.
    pub open_handles: u64,
    /// Bytes returned to callers.
    pub bytes_read: u64,
    /// Bytes accepted from callers.
    pub bytes_written: u64,
    /// Average upload latency in milliseconds.
    pub upload_latency_avg_ms: f64,
    /// When the engine started.
    pub session_start: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = VfsStats::new();
        stats.record_download(100);
        stats.record_download(50);
        stats.record_upload(10, Duration::from_millis(4));
        stats.record_write_back_failure();
        stats.record_purge();
        stats.record_list();

        let snap = stats.snapshot();
        assert_eq!(snap.downloads, 2);
        assert_eq!(snap.bytes_downloaded, 150);
        assert_eq!(snap.uploads, 1);
        assert_eq!(snap.bytes_uploaded, 10);
        assert_eq!(snap.write_back_failures, 1);
        assert_eq!(snap.purges, 1);
        assert_eq!(snap.remote_lists, 1);
        assert!((snap.upload_latency_avg_ms - 4.0).abs() < 0.01);
    }

    #[test]
    fn test_open_close_never_underflows() {
        let stats = VfsStats::new();
        stats.record_open();
        stats.record_close();
        stats.record_close();
        assert_eq!(stats.open_handle_count(), 0);
    }

    #[test]
    fn test_hit_rate_empty() {
        assert!(DirCacheSnapshot::default().hit_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = VfsStats::new();
        stats.dir_cache().record_flush();
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("\"flushes\":1"));
    }
}
