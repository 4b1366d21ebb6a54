use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use objvfs::{FileKind, Vfs};

use super::normalize_path;
use crate::output::{create_table, format_perm, format_time};

#[derive(ClapArgs)]
pub struct Args {
    /// File or directory path
    pub path: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatOutput {
    path: String,
    #[serde(rename = "type")]
    entry_type: &'static str,
    size: u64,
    modified: String,
    mode: String,
    uid: u32,
    gid: u32,
}

#[instrument(level = "info", name = "cmd::stat", skip_all, fields(path = %args.path))]
pub fn execute(vfs: &Vfs, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    let attr = vfs
        .stat(&path)
        .with_context(|| format!("Failed to stat {path}"))?;

    let output = StatOutput {
        entry_type: match attr.kind {
            FileKind::Directory => "directory",
            FileKind::File => "file",
        },
        size: attr.size,
        modified: format_time(attr.mod_time),
        mode: format!("{:o}", attr.perm),
        uid: attr.uid,
        gid: attr.gid,
        path,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let mut table = create_table();
    table.add_row(vec!["Path".to_string(), output.path]);
    table.add_row(vec!["Type".to_string(), output.entry_type.to_string()]);
    table.add_row(vec!["Size".to_string(), output.size.to_string()]);
    table.add_row(vec!["Modified".to_string(), output.modified]);
    table.add_row(vec![
        "Mode".to_string(),
        format!("{} ({})", format_perm(attr.kind, attr.perm), output.mode),
    ]);
    table.add_row(vec![
        "Owner".to_string(),
        format!("{}:{}", output.uid, output.gid),
    ]);
    println!("{table}");
    Ok(())
}
