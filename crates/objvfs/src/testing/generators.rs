//! Test data generators.
//!
//! The cache store moves data in blocks of [`COPY_BUF_SIZE`] bytes, so
//! content that straddles those boundaries catches off-by-one errors in
//! range fetching and write-back.

use rand::Rng;

/// Block size the cache store copies with.
pub const COPY_BUF_SIZE: usize = 64 * 1024;

/// Random bytes of the given size.
pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random()).collect()
}

/// Random content spanning `blocks` copy blocks plus one byte.
pub fn spanning_content(blocks: usize) -> Vec<u8> {
    random_bytes(blocks * COPY_BUF_SIZE + 1)
}

/// Every byte value once.
pub fn all_byte_values() -> Vec<u8> {
    (0u8..=255).collect()
}

/// Deterministic content where byte `i` is `i % 251`.
///
/// The prime period makes misplaced ranges show up as wrong values.
pub fn patterned(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// A path `depth` directories deep ending in `file.bin`.
pub fn deep_path(depth: usize) -> String {
    let mut parts: Vec<String> = (0..depth).map(|i| format!("d{i}")).collect();
    parts.push("file.bin".to_string());
    parts.join("/")
}

/// A file name with multi-byte characters.
pub fn unicode_filename() -> String {
    "résumé-文件-📁.txt".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(random_bytes(10).len(), 10);
        assert_eq!(spanning_content(2).len(), 2 * COPY_BUF_SIZE + 1);
        assert_eq!(all_byte_values().len(), 256);
    }

    #[test]
    fn test_patterned_is_deterministic() {
        let data = patterned(600);
        assert_eq!(data[0], 0);
        assert_eq!(data[251], 0);
        assert_eq!(data[252], 1);
        assert_eq!(data, patterned(600));
    }

    #[test]
    fn test_deep_path() {
        assert_eq!(deep_path(2), "d0/d1/file.bin");
        assert_eq!(deep_path(0), "file.bin");
    }
}
