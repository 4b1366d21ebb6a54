//! Cache mode policy: which handle variant an open gets.
//!
//! | Mode    | Read-only       | Write-only      | Read-write                      |
//! |---------|-----------------|-----------------|---------------------------------|
//! | off     | direct read     | direct write    | direct write (read capability lost) |
//! | minimal | direct read     | direct write    | buffered read-write, downloads first |
//! | writes  | direct read     | buffered write  | buffered read-write             |
//! | full    | buffered read   | buffered write  | buffered read-write             |
//!
//! Direct writes stream straight into one remote upload, so they can only
//! start from an empty object: they always behave as if `O_TRUNC` was given
//! and ignore `O_APPEND`.
//!
//! [`resolve`] has no side effects. The handle performs whatever buffering
//! the returned [`OpenPlan`] asks for.

use crate::config::CacheMode;
use std::fmt;

/// The access mode requested at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// `O_RDONLY`
    ReadOnly,
    /// `O_WRONLY`
    WriteOnly,
    /// `O_RDWR`
    ReadWrite,
}

impl AccessMode {
    /// Whether reading was requested.
    pub fn reads(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    /// Whether writing was requested.
    pub fn writes(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// Flags requested by the caller of `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenFlags {
    /// Requested access.
    pub access: AccessMode,
    /// `O_CREAT`
    pub create: bool,
    /// `O_EXCL`
    pub exclusive: bool,
    /// `O_TRUNC`
    pub truncate: bool,
    /// `O_APPEND`
    pub append: bool,
}

impl OpenFlags {
    fn with_access(access: AccessMode) -> Self {
        Self {
            access,
            create: false,
            exclusive: false,
            truncate: false,
            append: false,
        }
    }

    /// `O_RDONLY`
    pub fn read_only() -> Self {
        Self::with_access(AccessMode::ReadOnly)
    }

    /// `O_WRONLY`
    pub fn write_only() -> Self {
        Self::with_access(AccessMode::WriteOnly)
    }

    /// `O_RDWR`
    pub fn read_write() -> Self {
        Self::with_access(AccessMode::ReadWrite)
    }

    /// Adds `O_CREAT`.
    #[must_use]
    pub fn create(mut self) -> Self {
        self.create = true;
        self
    }

    /// Adds `O_EXCL`.
    #[must_use]
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Adds `O_TRUNC`.
    #[must_use]
    pub fn truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    /// Adds `O_APPEND`.
    #[must_use]
    pub fn append(mut self) -> Self {
        self.append = true;
        self
    }

    /// Decodes the flags word passed to `open(2)`.
    pub fn from_libc(flags: i32) -> Self {
        let access = match flags & libc::O_ACCMODE {
            libc::O_WRONLY => AccessMode::WriteOnly,
            libc::O_RDWR => AccessMode::ReadWrite,
            _ => AccessMode::ReadOnly,
        };
        Self {
            access,
            create: flags & libc::O_CREAT != 0,
            exclusive: flags & libc::O_EXCL != 0,
            truncate: flags & libc::O_TRUNC != 0,
            append: flags & libc::O_APPEND != 0,
        }
    }
}

/// The five handle variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Reads go straight to remote byte-range reads.
    DirectRead,
    /// Writes stream into a single remote upload.
    DirectWrite,
    /// Reads are served from a fully downloaded local copy.
    BufferedRead,
    /// Writes go to a local copy uploaded on close.
    BufferedWrite,
    /// Reads and writes go to a local copy uploaded on close.
    BufferedReadWrite,
}

impl HandleKind {
    /// Whether reads are allowed.
    pub fn can_read(self) -> bool {
        matches!(
            self,
            HandleKind::DirectRead | HandleKind::BufferedRead | HandleKind::BufferedReadWrite
        )
    }

    /// Whether writes are allowed.
    pub fn can_write(self) -> bool {
        matches!(
            self,
            HandleKind::DirectWrite | HandleKind::BufferedWrite | HandleKind::BufferedReadWrite
        )
    }

    /// Whether the handle goes through the on-disk cache.
    pub fn is_buffered(self) -> bool {
        matches!(
            self,
            HandleKind::BufferedRead | HandleKind::BufferedWrite | HandleKind::BufferedReadWrite
        )
    }

    /// Short name for logs.
    pub fn name(self) -> &'static str {
        match self {
            HandleKind::DirectRead => "direct-read",
            HandleKind::DirectWrite => "direct-write",
            HandleKind::BufferedRead => "buffered-read",
            HandleKind::BufferedWrite => "buffered-write",
            HandleKind::BufferedReadWrite => "buffered-read-write",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an open should do, as decided by [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPlan {
    /// Variant to construct.
    pub kind: HandleKind,
    /// Download the whole object before the first read or write.
    pub eager: bool,
    /// Start from an empty file.
    pub truncate: bool,
    /// Every write lands at end of file.
    pub append: bool,
    /// The requested flags were weakened to fit the mode.
    pub degraded: bool,
}

/// Maps a cache mode and requested flags to an [`OpenPlan`].
pub fn resolve(mode: CacheMode, flags: OpenFlags) -> OpenPlan {
    let honored = |kind: HandleKind, eager: bool| OpenPlan {
        kind,
        eager,
        truncate: flags.truncate,
        append: flags.append,
        degraded: false,
    };
    let direct_write = OpenPlan {
        kind: HandleKind::DirectWrite,
        eager: false,
        truncate: true,
        append: false,
        degraded: flags.access.reads() || flags.append || !flags.truncate,
    };

    match (mode, flags.access) {
        (CacheMode::Full, AccessMode::ReadOnly) => OpenPlan {
            truncate: false,
            append: false,
            ..honored(HandleKind::BufferedRead, true)
        },
        (_, AccessMode::ReadOnly) => OpenPlan {
            truncate: false,
            append: false,
            ..honored(HandleKind::DirectRead, false)
        },
        (CacheMode::Off, _) | (CacheMode::Minimal, AccessMode::WriteOnly) => direct_write,
        (CacheMode::Minimal, AccessMode::ReadWrite) => honored(HandleKind::BufferedReadWrite, true),
        (CacheMode::Writes, AccessMode::WriteOnly) => honored(HandleKind::BufferedWrite, false),
        (CacheMode::Writes, AccessMode::ReadWrite) => {
            honored(HandleKind::BufferedReadWrite, false)
        }
        (CacheMode::Full, AccessMode::WriteOnly) => honored(HandleKind::BufferedWrite, true),
        (CacheMode::Full, AccessMode::ReadWrite) => honored(HandleKind::BufferedReadWrite, true),
    }
}
