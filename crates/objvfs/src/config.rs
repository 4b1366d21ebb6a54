//! Engine configuration.
//!
//! [`VfsOptions`] is captured by value when a [`Vfs`](crate::Vfs) is built.
//! Changing the cache mode means building a fresh engine.

use crate::error::{VfsError, VfsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default time directory listings are trusted (5 minutes).
pub const DEFAULT_DIR_CACHE_TIME: Duration = Duration::from_secs(5 * 60);

/// Default age after which unused cached content is purged (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Default interval between reconciler cycles (1 minute).
pub const DEFAULT_CACHE_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default permission bits for files.
pub const DEFAULT_FILE_PERMS: u32 = 0o666;

/// Default permission bits for directories.
pub const DEFAULT_DIR_PERMS: u32 = 0o777;

/// How much local disk buffering the engine uses.
///
/// Modes are ordered: each one buffers strictly more than the previous.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Read and write straight to the remote.
    #[default]
    Off,
    /// Buffer only read-write opens.
    Minimal,
    /// Buffer every open that writes.
    Writes,
    /// Buffer everything; reads download whole files.
    Full,
}

impl CacheMode {
    /// Every mode, in ascending order.
    pub const ALL: [CacheMode; 4] = [
        CacheMode::Off,
        CacheMode::Minimal,
        CacheMode::Writes,
        CacheMode::Full,
    ];

    /// The lowercase name used in flags and config files.
    pub fn as_str(self) -> &'static str {
        match self {
            CacheMode::Off => "off",
            CacheMode::Minimal => "minimal",
            CacheMode::Writes => "writes",
            CacheMode::Full => "full",
        }
    }

    /// Whether cached content survives write-back and is purged by age.
    pub fn retains_content(self) -> bool {
        self == CacheMode::Full
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown cache mode name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown cache mode '{0}' (expected off, minimal, writes or full)")]
pub struct ParseCacheModeError(String);

impl FromStr for CacheMode {
    type Err = ParseCacheModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(CacheMode::Off),
            "minimal" => Ok(CacheMode::Minimal),
            "writes" => Ok(CacheMode::Writes),
            "full" => Ok(CacheMode::Full),
            _ => Err(ParseCacheModeError(s.to_string())),
        }
    }
}

/// Configuration snapshot for one engine instance.
///
/// Durations are written in human form in config files:
///
/// ```
/// use objvfs::{CacheMode, VfsOptions};
/// use std::time::Duration;
///
/// let options = VfsOptions::from_toml_str(r#"
///     cache_mode = "writes"
///     dir_cache_time = "30s"
///     cache_max_age = "2h"
/// "#)?;
/// assert_eq!(options.cache_mode, CacheMode::Writes);
/// assert_eq!(options.dir_cache_time, Duration::from_secs(30));
/// # Ok::<(), objvfs::VfsError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsOptions {
    /// Local buffering policy.
    pub cache_mode: CacheMode,

    /// How long a directory listing is trusted before it is re-listed.
    #[serde(with = "humantime_serde")]
    pub dir_cache_time: Duration,

    /// Age after which unused cached content is purged (`full` mode).
    #[serde(with = "humantime_serde")]
    pub cache_max_age: Duration,

    /// Interval between reconciler cycles.
    #[serde(with = "humantime_serde")]
    pub cache_poll_interval: Duration,

    /// Root of the on-disk cache area.
    pub cache_dir: PathBuf,

    /// Permission bits reported for files.
    pub file_perms: u32,

    /// Permission bits reported for directories.
    pub dir_perms: u32,

    /// Owner reported for every entry.
    pub uid: u32,

    /// Group reported for every entry.
    pub gid: u32,

    /// Upload attempts per dirty entry per reconciler cycle.
    pub write_back_attempts: u32,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::default(),
            dir_cache_time: DEFAULT_DIR_CACHE_TIME,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            cache_poll_interval: DEFAULT_CACHE_POLL_INTERVAL,
            cache_dir: default_cache_dir(),
            file_perms: DEFAULT_FILE_PERMS,
            dir_perms: DEFAULT_DIR_PERMS,
            uid: current_uid(),
            gid: current_gid(),
            write_back_attempts: 1,
        }
    }
}

impl VfsOptions {
    /// Parses options from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> VfsResult<Self> {
        let options: Self = toml::from_str(s).map_err(|e| VfsError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from a TOML file.
    pub fn load(path: &Path) -> VfsResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| VfsError::CacheIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Serializes the options as TOML.
    pub fn to_toml_string(&self) -> VfsResult<String> {
        toml::to_string_pretty(self).map_err(|e| VfsError::Config(e.to_string()))
    }

    /// Checks values that would make the engine misbehave.
    pub fn validate(&self) -> VfsResult<()> {
        if self.cache_poll_interval.is_zero() {
            return Err(VfsError::Config(
                "cache_poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.write_back_attempts == 0 {
            return Err(VfsError::Config(
                "write_back_attempts must be at least 1".to_string(),
            ));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(VfsError::Config("cache_dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Sets the cache mode.
    #[must_use]
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Sets the directory cache TTL.
    #[must_use]
    pub fn dir_cache_time(mut self, ttl: Duration) -> Self {
        self.dir_cache_time = ttl;
        self
    }

    /// Sets the maximum age of unused cached content.
    #[must_use]
    pub fn cache_max_age(mut self, age: Duration) -> Self {
        self.cache_max_age = age;
        self
    }

    /// Sets the reconciler poll interval.
    #[must_use]
    pub fn cache_poll_interval(mut self, interval: Duration) -> Self {
        self.cache_poll_interval = interval;
        self
    }

    /// Sets the on-disk cache root.
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Sets the permission bits reported for files.
    #[must_use]
    pub fn file_perms(mut self, perms: u32) -> Self {
        self.file_perms = perms;
        self
    }

    /// Sets the permission bits reported for directories.
    #[must_use]
    pub fn dir_perms(mut self, perms: u32) -> Self {
        self.dir_perms = perms;
        self
    }

    /// Sets the reconciler's upload attempts per dirty entry.
    #[must_use]
    pub fn write_back_attempts(mut self, attempts: u32) -> Self {
        self.write_back_attempts = attempts;
        self
    }
}

/// `<user cache dir>/objvfs/vfs`, or a temp-dir fallback without a home.
pub fn default_cache_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || std::env::temp_dir().join("objvfs").join("vfs"),
        |dirs| dirs.cache_dir().join("objvfs").join("vfs"),
    )
}

#[cfg(unix)]
fn current_uid() -> u32 {
    unsafe { libc::getuid() }
}

#[cfg(unix)]
fn current_gid() -> u32 {
    unsafe { libc::getgid() }
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}

#[cfg(not(unix))]
fn current_gid() -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = VfsOptions::default();
        assert_eq!(options.cache_mode, CacheMode::Off);
        assert_eq!(options.dir_cache_time, Duration::from_secs(300));
        assert_eq!(options.cache_max_age, Duration::from_secs(3600));
        assert_eq!(options.cache_poll_interval, Duration::from_secs(60));
        assert_eq!(options.file_perms, 0o666);
        assert_eq!(options.dir_perms, 0o777);
        assert!(options.cache_dir.ends_with("objvfs/vfs"));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let options = VfsOptions::default()
            .cache_mode(CacheMode::Full)
            .dir_cache_time(Duration::from_secs(1))
            .cache_max_age(Duration::ZERO)
            .cache_dir("/tmp/objvfs-test")
            .file_perms(0o644);
        assert_eq!(options.cache_mode, CacheMode::Full);
        assert_eq!(options.dir_cache_time, Duration::from_secs(1));
        assert_eq!(options.cache_max_age, Duration::ZERO);
        assert_eq!(options.cache_dir, PathBuf::from("/tmp/objvfs-test"));
        assert_eq!(options.file_perms, 0o644);
    }

    #[test]
    fn test_cache_mode_order_and_names() {
        assert!(CacheMode::Off < CacheMode::Minimal);
        assert!(CacheMode::Minimal < CacheMode::Writes);
        assert!(CacheMode::Writes < CacheMode::Full);
        for mode in CacheMode::ALL {
            assert_eq!(mode.as_str().parse::<CacheMode>().unwrap(), mode);
            assert_eq!(mode.to_string(), mode.as_str());
        }
        assert_eq!("FULL".parse::<CacheMode>().unwrap(), CacheMode::Full);
        assert!("sometimes".parse::<CacheMode>().is_err());
        assert!(CacheMode::Full.retains_content());
        assert!(!CacheMode::Writes.retains_content());
    }

    #[test]
    fn test_toml_round_trip_keeps_human_durations() {
        let options = VfsOptions::default()
            .cache_mode(CacheMode::Minimal)
            .cache_dir("/var/cache/objvfs");
        let text = options.to_toml_string().unwrap();
        assert!(text.contains("cache_mode = \"minimal\""));
        assert!(text.contains("dir_cache_time = \"5m\""));
        assert_eq!(VfsOptions::from_toml_str(&text).unwrap(), options);
    }

    #[test]
    fn test_toml_rejects_bad_values() {
        assert!(VfsOptions::from_toml_str("cache_mode = \"sometimes\"").is_err());
        assert!(VfsOptions::from_toml_str("cache_poll_interval = \"0s\"").is_err());
        assert!(VfsOptions::from_toml_str("write_back_attempts = 0").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("objvfs.toml");
        std::fs::write(&path, "cache_mode = \"full\"\ncache_max_age = \"10m\"\n").unwrap();
        let options = VfsOptions::load(&path).unwrap();
        assert_eq!(options.cache_mode, CacheMode::Full);
        assert_eq!(options.cache_max_age, Duration::from_secs(600));
        assert!(VfsOptions::load(&dir.path().join("missing.toml")).is_err());
    }
}
