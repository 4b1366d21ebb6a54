//! List command - list directory contents.
//!
//! # Examples
//!
//! ```bash
//! # List the root directory
//! objvfs --remote-root ~/bucket ls
//!
//! # List with details
//! objvfs --remote-root ~/bucket ls -l /documents
//!
//! # Output as JSON for scripting
//! objvfs --remote-root ~/bucket ls --json / | jq '.entries[].name'
//! ```

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use objvfs::{DirEntry, FileKind, Vfs};

use super::normalize_path;
use crate::output::{create_table, format_perm, format_size, format_time};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory to list (default: root)
    #[arg(default_value = "/")]
    pub path: String,

    /// Show detailed information
    #[arg(short, long)]
    pub long: bool,

    /// Output as JSON
    #[arg(long, conflicts_with = "long")]
    pub json: bool,
}

/// JSON output format for ls command
#[derive(Serialize)]
struct LsOutput {
    path: String,
    entries: Vec<EntryInfo>,
}

#[derive(Serialize)]
struct EntryInfo {
    name: String,
    #[serde(rename = "type")]
    entry_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

#[instrument(level = "info", name = "cmd::ls", skip_all, fields(path = %args.path))]
pub fn execute(vfs: &Vfs, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    let entries = vfs
        .readdir(&path)
        .with_context(|| format!("Failed to list {path}"))?;

    if args.json {
        print_json(path, &entries)?;
    } else if args.long {
        print_long_format(&entries);
    } else {
        for entry in &entries {
            match entry.attr.kind {
                FileKind::Directory => println!("{}/", entry.name),
                FileKind::File => println!("{}", entry.name),
            }
        }
    }
    Ok(())
}

fn print_json(path: String, entries: &[DirEntry]) -> Result<()> {
    let output = LsOutput {
        path,
        entries: entries
            .iter()
            .map(|entry| EntryInfo {
                name: entry.name.clone(),
                entry_type: match entry.attr.kind {
                    FileKind::Directory => "directory",
                    FileKind::File => "file",
                },
                size: (entry.attr.kind == FileKind::File).then_some(entry.attr.size),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_long_format(entries: &[DirEntry]) {
    let mut table = create_table();
    table.set_header(vec!["Mode", "Size", "Modified", "Name"]);

    for entry in entries {
        let (size, name) = match entry.attr.kind {
            FileKind::Directory => ("-".to_string(), format!("{}/", entry.name)),
            FileKind::File => (format_size(entry.attr.size), entry.name.clone()),
        };
        table.add_row(vec![
            format_perm(entry.attr.kind, entry.attr.perm),
            size,
            format_time(entry.attr.mod_time),
            name,
        ]);
    }

    println!("{table}");
}
