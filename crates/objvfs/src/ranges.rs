//! Populated byte-range bookkeeping for partially cached files.

use serde::{Deserialize, Serialize};

/// A set of half-open byte ranges `[start, end)`.
///
/// Ranges are kept sorted, non-empty and non-adjacent: inserting a range
/// that touches or overlaps existing ones merges them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeSet {
    ranges: Vec<(u64, u64)>,
}

impl RangeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set covering `[0, len)`.
    pub fn full(len: u64) -> Self {
        let mut set = Self::new();
        set.insert(0, len);
        set
    }

    /// Adds `[start, end)`. Returns true if coverage grew.
    pub fn insert(&mut self, start: u64, end: u64) -> bool {
        if start >= end {
            return false;
        }
        if self.covers(start, end) {
            return false;
        }
        // First range that could touch [start, end).
        let first = self.ranges.partition_point(|&(_, e)| e < start);
        let mut merged = (start, end);
        let mut last = first;
        while last < self.ranges.len() && self.ranges[last].0 <= end {
            merged.0 = merged.0.min(self.ranges[last].0);
            merged.1 = merged.1.max(self.ranges[last].1);
            last += 1;
        }
        self.ranges.splice(first..last, std::iter::once(merged));
        true
    }

    /// Returns true if every byte of `[start, end)` is present.
    pub fn covers(&self, start: u64, end: u64) -> bool {
        if start >= end {
            return true;
        }
        let idx = self.ranges.partition_point(|&(_, e)| e <= start);
        self.ranges
            .get(idx)
            .is_some_and(|&(s, e)| s <= start && e >= end)
    }

    /// Returns the gaps of `[start, end)` not present in the set.
    pub fn missing(&self, start: u64, end: u64) -> Vec<(u64, u64)> {
        let mut gaps = Vec::new();
        if start >= end {
            return gaps;
        }
        let mut cursor = start;
        let idx = self.ranges.partition_point(|&(_, e)| e <= start);
        for &(s, e) in &self.ranges[idx..] {
            if s >= end {
                break;
            }
            if s > cursor {
                gaps.push((cursor, s));
            }
            cursor = cursor.max(e);
            if cursor >= end {
                break;
            }
        }
        if cursor < end {
            gaps.push((cursor, end));
        }
        gaps
    }

    /// Drops everything at or beyond `len`.
    pub fn truncate(&mut self, len: u64) {
        self.ranges.retain(|&(s, _)| s < len);
        if let Some(last) = self.ranges.last_mut() {
            last.1 = last.1.min(len);
        }
    }

    /// Removes every range.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Returns true if nothing is present.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of bytes present.
    pub fn covered_bytes(&self) -> u64 {
        self.ranges.iter().map(|&(s, e)| e - s).sum()
    }

    /// Iterates over the stored ranges in order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.ranges.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_insert_merges_overlapping_and_adjacent() {
        let mut set = RangeSet::new();
        assert!(set.insert(10, 20));
        assert!(set.insert(30, 40));
        assert!(set.insert(20, 30));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(10, 40)]);
        assert!(!set.insert(15, 35));
        assert!(set.insert(0, 5));
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn test_missing() {
        let mut set = RangeSet::new();
        set.insert(10, 20);
        set.insert(30, 40);
        assert_eq!(set.missing(0, 50), vec![(0, 10), (20, 30), (40, 50)]);
        assert!(set.missing(12, 18).is_empty());
        assert_eq!(set.missing(15, 35), vec![(20, 30)]);
        assert!(set.missing(5, 5).is_empty());
    }

    #[test]
    fn test_truncate() {
        let mut set = RangeSet::full(100);
        set.insert(200, 300);
        set.truncate(50);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(0, 50)]);
        set.truncate(0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_serde_is_a_plain_list() {
        let set = RangeSet::full(8);
        assert_eq!(serde_json::to_string(&set).unwrap(), "[[0,8]]");
    }

    fn model(ops: &[(u64, u64)], len: u64) -> Vec<bool> {
        let mut bytes = vec![false; usize::try_from(len).unwrap()];
        for &(s, e) in ops {
            for b in s.min(len)..e.min(len) {
                bytes[usize::try_from(b).unwrap()] = true;
            }
        }
        bytes
    }

    proptest! {
        #[test]
        fn prop_matches_byte_model(
            ops in prop::collection::vec((0u64..200, 0u64..60), 0..20),
            query in (0u64..260, 0u64..260),
        ) {
            let ops: Vec<(u64, u64)> = ops.into_iter().map(|(s, l)| (s, s + l)).collect();
            let mut set = RangeSet::new();
            for &(s, e) in &ops {
                set.insert(s, e);
            }
            let bytes = model(&ops, 260);

            // Stored ranges are sorted and never touch.
            let stored: Vec<_> = set.iter().collect();
            for pair in stored.windows(2) {
                prop_assert!(pair[0].1 < pair[1].0);
            }
            prop_assert_eq!(set.covered_bytes(), bytes.iter().filter(|b| **b).count() as u64);

            let (a, b) = (query.0.min(query.1), query.0.max(query.1));
            let expect_cover = (a..b).all(|i| bytes[usize::try_from(i).unwrap()]);
            prop_assert_eq!(set.covers(a, b), expect_cover);

            let gaps = set.missing(a, b);
            let gap_bytes: u64 = gaps.iter().map(|(s, e)| e - s).sum();
            let expect_gap = (a..b).filter(|&i| !bytes[usize::try_from(i).unwrap()]).count() as u64;
            prop_assert_eq!(gap_bytes, expect_gap);
        }
    }
}
