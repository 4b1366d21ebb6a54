use anyhow::{Context, Result, bail};
use clap::Args as ClapArgs;
use tracing::{info, instrument, warn};

use objvfs::Vfs;

#[derive(ClapArgs)]
pub struct Args {
    /// Drop dirty content that cannot be written back instead of failing
    #[arg(long)]
    pub discard: bool,
}

#[instrument(level = "info", name = "cmd::cache_clean", skip_all)]
pub fn execute(vfs: &Vfs, args: &Args) -> Result<()> {
    // Push out anything a previous run left dirty before deleting it.
    let report = vfs.reconcile_now()?;
    if report.written_back > 0 {
        info!(count = report.written_back, "wrote back pending changes");
    }
    if report.failed > 0 {
        if !args.discard {
            bail!(
                "{} cached file(s) could not be written back; rerun with --discard to drop them",
                report.failed
            );
        }
        warn!(count = report.failed, "discarding unsaved cached content");
    }

    let root = vfs.cache_root().to_path_buf();
    vfs.clean_up()
        .with_context(|| format!("Failed to remove {}", root.display()))?;
    eprintln!("Removed cache area {}", root.display());
    Ok(())
}
