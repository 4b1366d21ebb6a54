//! Stats command for displaying engine and cache statistics.

use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use objvfs::{CycleReport, Vfs, VfsStatsSnapshot};

use crate::output::{create_table, format_size};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Run one reconciliation cycle first (writes back leftover dirty files)
    #[arg(long)]
    pub reconcile: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Serialize)]
struct StatsOutput {
    cache_mode: String,
    cache_root: String,
    cached_files: usize,
    dirty_files: usize,
    cached_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reconcile: Option<CycleReport>,
    engine: VfsStatsSnapshot,
}

#[instrument(level = "info", name = "cmd::stats", skip_all)]
pub fn execute(vfs: &Vfs, args: &Args) -> Result<()> {
    let reconcile = if args.reconcile {
        Some(vfs.reconcile_now()?)
    } else {
        None
    };

    let entries = vfs.cache().entries();
    let output = StatsOutput {
        cache_mode: vfs.options().cache_mode.to_string(),
        cache_root: vfs.cache_root().display().to_string(),
        cached_files: entries.len(),
        dirty_files: entries.iter().filter(|e| e.is_dirty()).count(),
        cached_bytes: entries.iter().map(|e| e.cached_bytes()).sum(),
        reconcile,
        engine: vfs.stats().snapshot(),
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Table => print_stats_table(&output),
    }
    Ok(())
}

fn print_stats_table(output: &StatsOutput) {
    let mut table = create_table();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Cache mode".to_string(), output.cache_mode.clone()]);
    table.add_row(vec!["Cache root".to_string(), output.cache_root.clone()]);
    table.add_row(vec![
        "Cached files".to_string(),
        format!(
            "{} ({} dirty, {})",
            output.cached_files,
            output.dirty_files,
            format_size(output.cached_bytes)
        ),
    ]);
    if let Some(report) = &output.reconcile {
        table.add_row(vec![
            "Reconcile".to_string(),
            format!(
                "{} written back, {} failed, {} purged, {} skipped",
                report.written_back, report.failed, report.purged, report.skipped
            ),
        ]);
    }
    let engine = &output.engine;
    table.add_row(vec![
        "Downloads".to_string(),
        format!("{} ({})", engine.downloads, format_size(engine.bytes_downloaded)),
    ]);
    table.add_row(vec![
        "Uploads".to_string(),
        format!(
            "{} ({}, avg {:.1} ms)",
            engine.uploads,
            format_size(engine.bytes_uploaded),
            engine.upload_latency_avg_ms
        ),
    ]);
    table.add_row(vec![
        "Write-back failures".to_string(),
        engine.write_back_failures.to_string(),
    ]);
    table.add_row(vec!["Remote listings".to_string(), engine.remote_lists.to_string()]);
    table.add_row(vec![
        "Directory cache".to_string(),
        format!(
            "{} hits, {} misses, {} flushes",
            engine.dir_cache.hits, engine.dir_cache.misses, engine.dir_cache.flushes
        ),
    ]);
    table.add_row(vec!["Purges".to_string(), engine.purges.to_string()]);
    println!("{table}");
}
