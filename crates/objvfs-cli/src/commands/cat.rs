use anyhow::Result;
use clap::Args as ClapArgs;
use std::io;
use tracing::instrument;

use objvfs::Vfs;

use super::{normalize_path, read_into};

#[derive(ClapArgs)]
pub struct Args {
    /// File path
    pub file: String,
}

#[instrument(level = "info", name = "cmd::cat", skip_all, fields(file = %args.file))]
pub fn execute(vfs: &Vfs, args: &Args) -> Result<()> {
    let path = normalize_path(&args.file);
    let mut stdout = io::stdout().lock();
    read_into(vfs, &path, &mut stdout)?;
    Ok(())
}
