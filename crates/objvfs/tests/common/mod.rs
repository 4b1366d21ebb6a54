//! Shared harness for engine integration tests.

#![allow(dead_code)]

use objvfs::{CacheMode, OpenFlags, Vfs, VfsOptions};
use objvfs_remote::MemoryRemote;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// An engine over a fresh in-memory remote with its own cache directory.
pub struct Harness {
    pub cache: TempDir,
    pub remote: MemoryRemote,
    pub vfs: Vfs,
}

/// Options for tests: the background reconciler never fires on its own.
pub fn test_options(mode: CacheMode, cache: &TempDir) -> VfsOptions {
    VfsOptions::default()
        .cache_mode(mode)
        .cache_dir(cache.path())
        .cache_poll_interval(Duration::from_secs(3600))
}

impl Harness {
    pub fn new(mode: CacheMode) -> Self {
        Self::with_options(mode, |options| options)
    }

    pub fn with_options(mode: CacheMode, tweak: impl FnOnce(VfsOptions) -> VfsOptions) -> Self {
        let cache = TempDir::new().expect("cache dir");
        let remote = MemoryRemote::new();
        let options = tweak(test_options(mode, &cache));
        let vfs = Vfs::new(Arc::new(remote.clone()), options).expect("engine");
        Self { cache, remote, vfs }
    }

    /// Drops the engine and starts a new one over the same remote and cache.
    pub fn restart(self) -> Self {
        let Self { cache, remote, vfs } = self;
        let options = vfs.options().clone();
        drop(vfs);
        let vfs = Vfs::new(Arc::new(remote.clone()), options).expect("engine");
        Self { cache, remote, vfs }
    }

    pub fn mode(&self) -> CacheMode {
        self.vfs.options().cache_mode
    }

    /// Creates (or replaces) `path` with `data` through a write-only handle.
    pub fn write_file(&self, path: &str, data: &[u8]) {
        let fh = self
            .vfs
            .open(path, OpenFlags::write_only().create().truncate())
            .expect("open for write");
        let mut offset = 0u64;
        for chunk in data.chunks(16 * 1024) {
            let n = self.vfs.write(fh, offset, chunk).expect("write");
            offset += n as u64;
        }
        self.vfs.close(fh).expect("close");
    }

    /// Reads all of `path` through a fresh read-only handle.
    pub fn read_file(&self, path: &str) -> Vec<u8> {
        let fh = self
            .vfs
            .open(path, OpenFlags::read_only())
            .expect("open for read");
        let content = read_to_end(&self.vfs, fh);
        self.vfs.close(fh).expect("close");
        content
    }
}

/// Reads from offset 0 until a zero-length read.
pub fn read_to_end(vfs: &Vfs, fh: u64) -> Vec<u8> {
    let mut content = Vec::new();
    let mut buf = vec![0u8; 10_000];
    loop {
        let n = vfs
            .read(fh, content.len() as u64, &mut buf)
            .expect("read");
        if n == 0 {
            return content;
        }
        content.extend_from_slice(&buf[..n]);
    }
}
