use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{debug, instrument};

use objvfs::{FileKind, Vfs};
use objvfs_remote::path;

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// Path to remove
    pub path: String,

    /// Remove directories and their contents recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Ignore nonexistent files
    #[arg(short, long)]
    pub force: bool,
}

#[instrument(level = "info", name = "cmd::rm", skip_all, fields(path = %args.path))]
pub fn execute(vfs: &Vfs, args: &Args) -> Result<()> {
    let target = normalize_path(&args.path);
    let attr = match vfs.stat(&target) {
        Ok(attr) => attr,
        Err(e) if e.is_not_found() && args.force => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to remove {target}")),
    };

    if attr.kind == FileKind::Directory && args.recursive {
        let removed = remove_tree(vfs, &path::normalize(&target))?;
        eprintln!("Deleted {removed} entries");
        return Ok(());
    }
    vfs.remove(&target)
        .with_context(|| format!("Failed to remove {target}"))?;
    Ok(())
}

/// Removes `dir` and everything below it, children first.
fn remove_tree(vfs: &Vfs, dir: &str) -> Result<usize> {
    let mut removed = 0;
    for entry in vfs.readdir(dir)? {
        let child = path::join(dir, &entry.name);
        if entry.attr.kind == FileKind::Directory {
            removed += remove_tree(vfs, &child)?;
        } else {
            vfs.remove(&child)
                .with_context(|| format!("Failed to remove /{child}"))?;
            removed += 1;
        }
    }
    debug!(path = dir, "removing directory");
    vfs.remove(dir)
        .with_context(|| format!("Failed to remove /{dir}"))?;
    Ok(removed + 1)
}
