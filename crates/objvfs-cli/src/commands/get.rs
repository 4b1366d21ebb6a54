use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{info, instrument};

use objvfs::Vfs;

use super::{normalize_path, read_into};

#[derive(ClapArgs)]
pub struct Args {
    /// File path to download
    pub source: String,

    /// Local destination ("-" for stdout)
    pub dest: PathBuf,
}

#[instrument(level = "info", name = "cmd::get", skip_all, fields(source = %args.source))]
pub fn execute(vfs: &Vfs, args: &Args) -> Result<()> {
    let source = normalize_path(&args.source);
    if args.dest.as_os_str() == "-" {
        let mut stdout = io::stdout().lock();
        read_into(vfs, &source, &mut stdout)?;
        return Ok(());
    }

    let file = File::create(&args.dest)
        .with_context(|| format!("Failed to create {}", args.dest.display()))?;
    let mut out = BufWriter::new(file);
    let copied = read_into(vfs, &source, &mut out)?;
    info!(bytes = copied, dest = %args.dest.display(), "download complete");
    Ok(())
}
