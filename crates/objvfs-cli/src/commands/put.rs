use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{info, instrument};

use objvfs::{OpenFlags, Vfs};

use super::{normalize_path, write_from};

#[derive(ClapArgs)]
pub struct Args {
    /// Local file to upload ("-" for stdin)
    pub source: PathBuf,

    /// Destination path
    pub dest: String,

    /// Append to the file instead of replacing it (needs --cache-mode writes or full)
    #[arg(short, long)]
    pub append: bool,
}

#[instrument(level = "info", name = "cmd::put", skip_all, fields(dest = %args.dest))]
pub fn execute(vfs: &Vfs, args: &Args) -> Result<()> {
    let dest = normalize_path(&args.dest);
    let flags = if args.append {
        OpenFlags::write_only().create().append()
    } else {
        OpenFlags::write_only().create().truncate()
    };

    let mut input: Box<dyn Read> = if args.source.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(
            File::open(&args.source)
                .with_context(|| format!("Failed to open {}", args.source.display()))?,
        )
    };

    let copied = write_from(vfs, &dest, flags, &mut input)?;
    info!(bytes = copied, "upload complete");
    Ok(())
}
