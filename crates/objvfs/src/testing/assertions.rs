//! Custom assertions for engine tests.

use crate::error::{ErrorKind, VfsResult};

/// Asserts two byte slices are equal.
///
/// On failure, shows sizes and the first differing position rather than
/// dumping potentially huge byte arrays.
#[track_caller]
pub fn assert_bytes_equal(actual: &[u8], expected: &[u8], context: &str) {
    assert!(
        actual.len() == expected.len(),
        "{context}: size mismatch - expected {} bytes, got {} bytes",
        expected.len(),
        actual.len()
    );
    if let Some((i, (a, e))) = actual
        .iter()
        .zip(expected)
        .enumerate()
        .find(|(_, (a, e))| a != e)
    {
        panic!("{context}: content mismatch at byte {i} - expected 0x{e:02x}, got 0x{a:02x}");
    }
}

/// Asserts a result failed with the given error kind.
#[track_caller]
pub fn assert_kind<T: std::fmt::Debug>(result: VfsResult<T>, expected: ErrorKind, context: &str) {
    match result {
        Ok(value) => panic!("{context}: expected {expected:?} but got success with {value:?}"),
        Err(err) => assert!(
            err.kind() == expected,
            "{context}: expected {expected:?} ({}), got {:?} ({err})",
            expected.name(),
            err.kind(),
        ),
    }
}
