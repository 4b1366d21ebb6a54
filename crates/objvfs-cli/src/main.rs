#![deny(unsafe_code)]

mod commands;
mod exit_code;
mod output;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use humantime_serde::re::humantime;
use tracing_subscriber::EnvFilter;

use objvfs::{CacheMode, ErrorKind, ShutdownMode, Vfs, VfsError, VfsOptions};
use objvfs_remote::{LocalDirRemote, RemoteError};

use crate::commands::{cache_clean, cat, get, ls, mkdir, mv, put, rm, stat, stats};

/// Drive the objvfs cache engine over a local directory acting as the object store
#[derive(Parser)]
#[command(name = "objvfs")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Upload a file through the write-back cache
    objvfs --remote-root ~/bucket --cache-mode writes put report.pdf /docs/report.pdf

    # List a directory as JSON
    objvfs --remote-root ~/bucket ls --json /docs

    # Read a file with full caching, keeping the local copy for an hour
    objvfs --remote-root ~/bucket --cache-mode full --cache-max-age 1h cat /docs/notes.txt

    # Write back anything a crashed run left dirty, then show statistics
    objvfs --remote-root ~/bucket stats --reconcile
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Engine options. Flags override values from `--config`.
#[derive(clap::Args)]
struct EngineArgs {
    /// Directory that stands in for the remote object store
    #[arg(long, env = "OBJVFS_REMOTE_ROOT", value_name = "DIR", global = true)]
    remote_root: Option<PathBuf>,

    /// TOML file with engine options
    #[arg(long, env = "OBJVFS_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Cache mode: off, minimal, writes or full
    #[arg(long, value_name = "MODE", global = true)]
    cache_mode: Option<CacheMode>,

    /// How long directory listings are trusted (e.g. "30s", "5m")
    #[arg(long, value_name = "DURATION", value_parser = parse_duration, global = true)]
    dir_cache_time: Option<Duration>,

    /// Age after which unused cached content is purged in full mode
    #[arg(long, value_name = "DURATION", value_parser = parse_duration, global = true)]
    cache_max_age: Option<Duration>,

    /// Interval between background reconciliation cycles
    #[arg(long, value_name = "DURATION", value_parser = parse_duration, global = true)]
    cache_poll_interval: Option<Duration>,

    /// Root of the on-disk cache area
    #[arg(long, env = "OBJVFS_CACHE_DIR", value_name = "DIR", global = true)]
    cache_dir: Option<PathBuf>,
}

fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

impl EngineArgs {
    fn options(&self) -> Result<VfsOptions> {
        let mut options = match &self.config {
            Some(path) => VfsOptions::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => VfsOptions::default(),
        };
        if let Some(mode) = self.cache_mode {
            options = options.cache_mode(mode);
        }
        if let Some(ttl) = self.dir_cache_time {
            options = options.dir_cache_time(ttl);
        }
        if let Some(age) = self.cache_max_age {
            options = options.cache_max_age(age);
        }
        if let Some(interval) = self.cache_poll_interval {
            options = options.cache_poll_interval(interval);
        }
        if let Some(dir) = &self.cache_dir {
            options = options.cache_dir(dir);
        }
        options.validate()?;
        Ok(options)
    }

    fn start(&self) -> Result<Vfs> {
        let Some(root) = &self.remote_root else {
            anyhow::bail!("--remote-root is required (or set OBJVFS_REMOTE_ROOT)");
        };
        let options = self.options()?;
        let remote = LocalDirRemote::new(root)
            .with_context(|| format!("Failed to open remote root: {}", root.display()))?;
        Vfs::new(Arc::new(remote), options).context("Failed to start the engine")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List directory contents
    Ls(ls::Args),

    /// Show attributes of a file or directory
    Stat(stat::Args),

    /// Write a file's contents to stdout
    Cat(cat::Args),

    /// Upload a local file (or stdin)
    Put(put::Args),

    /// Download a file to a local path (or stdout)
    Get(get::Args),

    /// Create a directory
    Mkdir(mkdir::Args),

    /// Remove a file or directory
    Rm(rm::Args),

    /// Move or rename a file or directory
    Mv(mv::Args),

    /// Remove the on-disk cache area
    CacheClean(cache_clean::Args),

    /// Show engine and cache statistics
    Stats(stats::Args),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");
            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let vfs = cli.engine.start()?;
    let result = match cli.command {
        Commands::Ls(args) => ls::execute(&vfs, &args),
        Commands::Stat(args) => stat::execute(&vfs, &args),
        Commands::Cat(args) => cat::execute(&vfs, &args),
        Commands::Put(args) => put::execute(&vfs, &args),
        Commands::Get(args) => get::execute(&vfs, &args),
        Commands::Mkdir(args) => mkdir::execute(&vfs, &args),
        Commands::Rm(args) => rm::execute(&vfs, &args),
        Commands::Mv(args) => mv::execute(&vfs, &args),
        Commands::CacheClean(args) => cache_clean::execute(&vfs, &args),
        Commands::Stats(args) => stats::execute(&vfs, &args),
    };

    // Surface write-back failures of anything still open instead of only logging them.
    let shutdown = vfs
        .shutdown(ShutdownMode::Graceful)
        .context("Failed to shut down the engine cleanly");
    result.and(shutdown)
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Maps an error chain to an exit code by its typed causes.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(vfs_err) = cause.downcast_ref::<VfsError>() {
            return kind_exit_code(vfs_err.kind());
        }
        if let Some(remote_err) = cause.downcast_ref::<RemoteError>() {
            return kind_exit_code(ErrorKind::from(remote_err));
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::NotFound => return exit_code::NOT_FOUND,
                io::ErrorKind::PermissionDenied => return exit_code::PERMISSION_DENIED,
                _ => {}
            }
        }
    }
    exit_code::GENERAL_ERROR
}

fn kind_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::NotFound => exit_code::NOT_FOUND,
        ErrorKind::AlreadyExists => exit_code::ALREADY_EXISTS,
        ErrorKind::PermissionDenied => exit_code::PERMISSION_DENIED,
        ErrorKind::Unsupported => exit_code::UNSUPPORTED,
        ErrorKind::Busy => exit_code::BUSY,
        ErrorKind::WriteBackFailed => exit_code::WRITE_BACK_FAILED,
        ErrorKind::Transient => exit_code::REMOTE_UNAVAILABLE,
        ErrorKind::InvalidArgument => exit_code::USAGE_ERROR,
        ErrorKind::NotEmpty
        | ErrorKind::IsDirectory
        | ErrorKind::NotDirectory
        | ErrorKind::BadHandle
        | ErrorKind::Io
        | ErrorKind::ShutDown => exit_code::GENERAL_ERROR,
    }
}
