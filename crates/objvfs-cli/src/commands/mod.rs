pub mod cache_clean;
pub mod cat;
pub mod get;
pub mod ls;
pub mod mkdir;
pub mod mv;
pub mod put;
pub mod rm;
pub mod stat;
pub mod stats;

use std::io::{self, Read, Write};

use anyhow::{Context, Result};

use objvfs::{OpenFlags, Vfs};

/// Transfer size for reads and writes through the engine.
const CHUNK_SIZE: usize = 64 * 1024;

/// Normalize a path to ensure it starts with `/`.
/// This makes paths like `docs/a.txt` work the same as `/docs/a.txt`.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Streams a whole file out of the engine into `out`.
pub fn read_into(vfs: &Vfs, path: &str, out: &mut dyn Write) -> Result<u64> {
    let fh = vfs
        .open(path, OpenFlags::read_only())
        .with_context(|| format!("Failed to open {path}"))?;
    let copied = copy_out(vfs, fh, out).with_context(|| format!("Failed to read {path}"));
    let closed = vfs
        .close(fh)
        .with_context(|| format!("Failed to close {path}"));
    let copied = copied?;
    closed?;
    Ok(copied)
}

fn copy_out(vfs: &Vfs, fh: u64, out: &mut dyn Write) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut offset = 0u64;
    loop {
        let n = vfs.read(fh, offset, &mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        offset += n as u64;
    }
    out.flush()?;
    Ok(offset)
}

/// Streams `input` into `path`, uploading on close.
pub fn write_from(vfs: &Vfs, path: &str, flags: OpenFlags, input: &mut dyn Read) -> Result<u64> {
    let fh = vfs
        .open(path, flags)
        .with_context(|| format!("Failed to open {path} for writing"))?;
    let copied = copy_in(vfs, fh, input).with_context(|| format!("Failed to write {path}"));
    let closed = vfs
        .close(fh)
        .with_context(|| format!("Failed to upload {path}"));
    let copied = copied?;
    closed?;
    Ok(copied)
}

fn copy_in(vfs: &Vfs, fh: u64, input: &mut dyn Read) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut offset = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        let written = vfs.write(fh, offset, &buf[..n])?;
        offset += written as u64;
    }
    Ok(offset)
}
