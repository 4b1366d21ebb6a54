//! Testing utilities shared by the engine's unit and integration tests.
//!
//! - **Generators**: content sized around the cache's copy buffer and
//!   awkward file names
//! - **Assertions**: content and error-kind checks with readable failures
//!
//! # Usage
//!
//! ```
//! use objvfs::testing::{assert_bytes_equal, random_bytes};
//!
//! let data = random_bytes(128);
//! assert_bytes_equal(&data, &data, "identity");
//! ```

pub mod assertions;
pub mod generators;

pub use assertions::{assert_bytes_equal, assert_kind};
pub use generators::{
    COPY_BUF_SIZE, all_byte_values, deep_path, patterned, random_bytes, spanning_content,
    unicode_filename,
};
