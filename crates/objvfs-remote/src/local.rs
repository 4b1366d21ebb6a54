//! A local directory used as an object store.
//!
//! Writes are whole-object: bytes go to a temporary file next to the
//! destination and are renamed over it on commit, so readers never observe
//! a half-written object.

use crate::path;
use crate::{Remote, RemoteEntry, RemoteError, RemoteResult, RemoteWriter};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Prefix of in-flight upload files; hidden from listings.
const UPLOAD_PREFIX: &str = ".objvfs-upload-";

/// Object store backed by a directory on local disk.
#[derive(Debug, Clone)]
pub struct LocalDirRemote {
    root: PathBuf,
    name: String,
}

impl LocalDirRemote {
    /// Opens `root` as a store. The directory must already exist.
    pub fn new(root: impl Into<PathBuf>) -> RemoteResult<Self> {
        let root = root.into();
        let display = root.display().to_string();
        let meta = fs::metadata(&root).map_err(|e| RemoteError::from_io(&display, e))?;
        if !meta.is_dir() {
            return Err(RemoteError::NotDirectory { path: display });
        }
        Ok(Self {
            name: format!("local:{display}"),
            root,
        })
    }

    /// The directory this store lives in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, remote_path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for segment in path::segments(remote_path) {
            full.push(segment);
        }
        full
    }

    fn entry_from_meta(name: &str, meta: &fs::Metadata) -> RemoteEntry {
        let mod_time = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if meta.is_dir() {
            RemoteEntry::dir(name, mod_time)
        } else {
            RemoteEntry::file(name, meta.len(), mod_time)
        }
    }
}

impl Remote for LocalDirRemote {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self, dir: &str) -> RemoteResult<Vec<RemoteEntry>> {
        trace!(path = dir, "local list");
        let full = self.full_path(dir);
        let read_dir = fs::read_dir(&full).map_err(|e| RemoteError::from_io(dir, e))?;

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| RemoteError::from_io(dir, e))?;
            let Ok(name) = item.file_name().into_string() else {
                debug!(path = dir, "skipping non-UTF-8 entry");
                continue;
            };
            if name.starts_with(UPLOAD_PREFIX) {
                continue;
            }
            let meta = match item.metadata() {
                Ok(meta) => meta,
                // Removed between readdir and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(RemoteError::from_io(&path::join(dir, &name), e)),
            };
            entries.push(Self::entry_from_meta(&name, &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, remote_path: &str) -> RemoteResult<RemoteEntry> {
        let meta = fs::metadata(self.full_path(remote_path))
            .map_err(|e| RemoteError::from_io(remote_path, e))?;
        Ok(Self::entry_from_meta(path::file_name(remote_path), &meta))
    }

    fn open_read(&self, remote_path: &str, offset: u64) -> RemoteResult<Box<dyn Read + Send>> {
        trace!(path = remote_path, offset, "local open_read");
        let full = self.full_path(remote_path);
        let meta = fs::metadata(&full).map_err(|e| RemoteError::from_io(remote_path, e))?;
        if meta.is_dir() {
            return Err(RemoteError::IsDirectory {
                path: remote_path.to_string(),
            });
        }
        let mut file = File::open(&full).map_err(|e| RemoteError::from_io(remote_path, e))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| RemoteError::from_io(remote_path, e))?;
        }
        Ok(Box::new(file))
    }

    fn open_write(&self, remote_path: &str) -> RemoteResult<Box<dyn RemoteWriter>> {
        trace!(path = remote_path, "local open_write");
        let dest = self.full_path(remote_path);
        if dest.is_dir() {
            return Err(RemoteError::IsDirectory {
                path: remote_path.to_string(),
            });
        }
        let parent = dest.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent).map_err(|e| RemoteError::from_io(remote_path, e))?;
        let temp = tempfile::Builder::new()
            .prefix(UPLOAD_PREFIX)
            .tempfile_in(&parent)
            .map_err(|e| RemoteError::from_io(remote_path, e))?;
        Ok(Box::new(LocalWriter {
            path: remote_path.to_string(),
            dest,
            temp,
        }))
    }

    fn remove(&self, remote_path: &str) -> RemoteResult<()> {
        let full = self.full_path(remote_path);
        if full.is_dir() {
            return Err(RemoteError::IsDirectory {
                path: remote_path.to_string(),
            });
        }
        fs::remove_file(full).map_err(|e| RemoteError::from_io(remote_path, e))
    }

    fn mkdir(&self, dir: &str) -> RemoteResult<()> {
        let full = self.full_path(dir);
        if full.exists() {
            return Err(RemoteError::AlreadyExists {
                path: dir.to_string(),
            });
        }
        fs::create_dir_all(full).map_err(|e| RemoteError::from_io(dir, e))
    }

    fn rmdir(&self, dir: &str) -> RemoteResult<()> {
        let full = self.full_path(dir);
        if full.is_file() {
            return Err(RemoteError::NotDirectory {
                path: dir.to_string(),
            });
        }
        fs::remove_dir(full).map_err(|e| RemoteError::from_io(dir, e))
    }

    fn rename(&self, src: &str, dst: &str) -> RemoteResult<()> {
        trace!(src, dst, "local rename");
        let to = self.full_path(dst);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| RemoteError::from_io(dst, e))?;
        }
        fs::rename(self.full_path(src), to).map_err(|e| RemoteError::from_io(src, e))
    }
}

struct LocalWriter {
    path: String,
    dest: PathBuf,
    temp: NamedTempFile,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl RemoteWriter for LocalWriter {
    fn commit(self: Box<Self>) -> RemoteResult<RemoteEntry> {
        let LocalWriter { path, dest, temp } = *self;
        temp.as_file()
            .sync_all()
            .map_err(|e| RemoteError::from_io(&path, e))?;
        temp.persist(&dest)
            .map_err(|e| RemoteError::from_io(&path, e.error))?;
        let meta = fs::metadata(&dest).map_err(|e| RemoteError::from_io(&path, e))?;
        debug!(path = %path, size = meta.len(), "local commit");
        Ok(Self::entry(&path, &meta))
    }

    fn abort(self: Box<Self>) {
        trace!(path = %self.path, "local upload aborted");
        // NamedTempFile removes itself on drop.
    }
}

impl LocalWriter {
    fn entry(remote_path: &str, meta: &fs::Metadata) -> RemoteEntry {
        LocalDirRemote::entry_from_meta(path::file_name(remote_path), meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalDirRemote) {
        let dir = TempDir::new().unwrap();
        let remote = LocalDirRemote::new(dir.path()).unwrap();
        (dir, remote)
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(LocalDirRemote::new(missing).unwrap_err().is_not_found());
    }

    #[test]
    fn test_write_commit_read() {
        let (_dir, remote) = setup();
        let mut w = remote.open_write("a/b.txt").unwrap();
        w.write_all(b"hello").unwrap();
        // Not visible until commit, and the temp file is hidden from listings.
        assert!(remote.stat("a/b.txt").unwrap_err().is_not_found());
        assert!(remote.list("a").unwrap().is_empty());
        let entry = w.commit().unwrap();
        assert_eq!(entry.size, 5);

        let mut out = String::new();
        remote
            .open_read("a/b.txt", 1)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "ello");
    }

    #[test]
    fn test_abort_leaves_previous_object() {
        let (_dir, remote) = setup();
        let mut w = remote.open_write("f").unwrap();
        w.write_all(b"v1").unwrap();
        w.commit().unwrap();

        let mut w = remote.open_write("f").unwrap();
        w.write_all(b"v2-longer").unwrap();
        w.abort();
        assert_eq!(remote.stat("f").unwrap().size, 2);
        assert_eq!(remote.list("").unwrap().len(), 1);
    }

    #[test]
    fn test_directory_operations() {
        let (_dir, remote) = setup();
        remote.mkdir("d/e").unwrap();
        assert!(remote.stat("d").unwrap().is_dir);
        assert!(matches!(
            remote.mkdir("d").unwrap_err(),
            RemoteError::AlreadyExists { .. }
        ));
        assert!(matches!(
            remote.rmdir("d").unwrap_err(),
            RemoteError::NotEmpty { .. }
        ));
        remote.rmdir("d/e").unwrap();
        remote.rmdir("d").unwrap();
        assert!(remote.list("d").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rename_and_remove() {
        let (_dir, remote) = setup();
        let mut w = remote.open_write("x").unwrap();
        w.write_all(b"1").unwrap();
        w.commit().unwrap();

        remote.rename("x", "sub/y").unwrap();
        assert!(remote.stat("x").unwrap_err().is_not_found());
        assert_eq!(remote.stat("sub/y").unwrap().size, 1);

        assert!(matches!(
            remote.remove("sub").unwrap_err(),
            RemoteError::IsDirectory { .. }
        ));
        remote.remove("sub/y").unwrap();
        assert!(remote.remove("sub/y").unwrap_err().is_not_found());
    }
}
