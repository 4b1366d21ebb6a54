//! Exit codes for the CLI.
//!
//! These follow common Unix conventions and let scripts tell failure
//! classes apart without parsing messages.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments or configuration)
pub const USAGE_ERROR: u8 = 2;

/// File or directory not found
pub const NOT_FOUND: u8 = 3;

/// Target already exists
pub const ALREADY_EXISTS: u8 = 4;

/// Permission denied by the remote or the local filesystem
pub const PERMISSION_DENIED: u8 = 5;

/// Operation not possible in the selected cache mode
pub const UNSUPPORTED: u8 = 6;

/// Another writer holds the file
pub const BUSY: u8 = 7;

/// Upload failed; the content stays in the cache for a later retry
pub const WRITE_BACK_FAILED: u8 = 8;

/// The remote failed in a way that may succeed on retry
pub const REMOTE_UNAVAILABLE: u8 = 9;
