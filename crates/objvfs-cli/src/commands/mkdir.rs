use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use objvfs::{ErrorKind, FileKind, Vfs};
use objvfs_remote::path;

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// Directory path to create
    pub path: String,

    /// Create parent directories as needed; no error if it exists
    #[arg(short, long)]
    pub parents: bool,
}

#[instrument(level = "info", name = "cmd::mkdir", skip_all, fields(path = %args.path))]
pub fn execute(vfs: &Vfs, args: &Args) -> Result<()> {
    let target = normalize_path(&args.path);
    if !args.parents {
        vfs.mkdir(&target)
            .with_context(|| format!("Failed to create {target}"))?;
        return Ok(());
    }

    let mut current = String::new();
    for segment in path::segments(&path::normalize(&target)) {
        current = path::join(&current, segment);
        match vfs.mkdir(&current) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let attr = vfs.stat(&current)?;
                if attr.kind != FileKind::Directory {
                    anyhow::bail!("Not a directory: /{current}");
                }
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create /{current}"));
            }
        }
    }
    Ok(())
}
