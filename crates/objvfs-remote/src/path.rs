//! Root-relative remote path helpers.
//!
//! Paths are plain strings with `/` separators, no leading or trailing
//! slash, and the empty string for the root. Every path entering the engine
//! goes through [`normalize`] first.

/// Normalizes a user supplied path.
///
/// Strips leading/trailing slashes, collapses repeated separators, drops `.`
/// segments and resolves `..` without ever climbing above the root.
///
/// ```
/// use objvfs_remote::path::normalize;
///
/// assert_eq!(normalize("/a//b/./c/"), "a/b/c");
/// assert_eq!(normalize("/a/../../b"), "b");
/// assert_eq!(normalize("/"), "");
/// ```
pub fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    out.join("/")
}

/// Returns the parent of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rfind('/').map_or("", |idx| &path[..idx]))
}

/// Returns the final segment of `path` (empty for the root).
pub fn file_name(path: &str) -> &str {
    path.rfind('/').map_or(path, |idx| &path[idx + 1..])
}

/// Splits `path` into its parent and final segment.
pub fn split(path: &str) -> (&str, &str) {
    (parent(path).unwrap_or(""), file_name(path))
}

/// Joins a directory path and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Iterates over the segments of a normalized path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Returns true if `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return !path.is_empty();
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Rewrites the `from` prefix of `path` to `to`.
///
/// `path` must be `from` itself or one of its descendants.
pub fn rebase(path: &str, from: &str, to: &str) -> String {
    if path == from {
        return to.to_string();
    }
    let rest = if from.is_empty() {
        path
    } else {
        &path[from.len() + 1..]
    };
    join(to, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("a"), "a");
        assert_eq!(normalize("/a/b/"), "a/b");
        assert_eq!(normalize("a/./b"), "a/b");
        assert_eq!(normalize("../../etc"), "etc");
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent(""), None);
        assert_eq!(parent("a"), Some(""));
        assert_eq!(parent("a/b/c"), Some("a/b"));
        assert_eq!(file_name("a/b/c"), "c");
        assert_eq!(file_name("c"), "c");
        assert_eq!(split("a/b"), ("a", "b"));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "x"), "x");
        assert_eq!(join("a/b", "x"), "a/b/x");
    }

    #[test]
    fn test_is_descendant() {
        assert!(is_descendant("a/b", "a"));
        assert!(is_descendant("a", ""));
        assert!(!is_descendant("ab", "a"));
        assert!(!is_descendant("a", "a"));
        assert!(!is_descendant("", ""));
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase("a/b/c", "a/b", "x"), "x/c");
        assert_eq!(rebase("a/b", "a/b", "x/y"), "x/y");
        assert_eq!(rebase("a/b", "", "root"), "root/a/b");
    }

    #[test]
    fn test_segments() {
        let segs: Vec<_> = segments("a/b/c").collect();
        assert_eq!(segs, vec!["a", "b", "c"]);
        assert_eq!(segments("").count(), 0);
    }
}
