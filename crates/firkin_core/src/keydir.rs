//! In-memory index from live keys to their latest on-disk location.
//!
//! The keydir is the read path: one hash lookup yields the exact segment,
//! offset and length of a key's newest value. A secondary ordered index over
//! the same keys serves range scans; the two structures are updated in
//! lockstep and never disagree. The second copy of every key is the memory
//! price of ordered scans over a hash index. `Bytes` keys keep it to a
//! refcount bump rather than a full buffer copy.
//!
//! The keydir holds only live keys. Deletes remove the entry outright, so a
//! locator never points at a tombstone.

use crate::types::SegmentId;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Bound;

/// Location of one record on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    /// Segment holding the record.
    pub segment_id: SegmentId,
    /// Byte offset of the record's start within the segment.
    pub offset: u64,
    /// Full encoded record length.
    pub length: u32,
    /// Timestamp carried by the record.
    pub timestamp: u32,
}

/// The live-key index.
#[derive(Debug, Default)]
pub struct KeyDir {
    map: HashMap<Bytes, Locator>,
    ordered: BTreeSet<Bytes>,
}

impl KeyDir {
    /// Creates an empty keydir.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the locator for a key, if live.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Locator> {
        self.map.get(key).copied()
    }

    /// Points a key at a new location, returning the prior locator if any.
    pub fn put(&mut self, key: Bytes, locator: Locator) -> Option<Locator> {
        let prior = self.map.insert(key.clone(), locator);
        if prior.is_none() {
            self.ordered.insert(key);
        }
        prior
    }

    /// Removes a key, returning its last locator if it was live.
    pub fn remove(&mut self, key: &[u8]) -> Option<Locator> {
        let prior = self.map.remove(key);
        if prior.is_some() {
            self.ordered.remove(key);
        }
        prior
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no keys are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Ascending live keys within the given bounds.
    ///
    /// This is the scan snapshot: cheap clones of shared key buffers taken
    /// under the lock, resolved lazily afterwards.
    #[must_use]
    pub fn keys_in_range(&self, lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> Vec<Bytes> {
        if empty_bounds(&lower, &upper) {
            return Vec::new();
        }
        self.ordered
            .range::<[u8], _>((lower, upper))
            .cloned()
            .collect()
    }

    /// Live entries whose locator lies in one of the given segments, in
    /// ascending key order. The compaction snapshot.
    #[must_use]
    pub fn entries_in_segments(&self, segments: &HashSet<SegmentId>) -> Vec<(Bytes, Locator)> {
        self.ordered
            .iter()
            .filter_map(|key| {
                let locator = self.map.get(key)?;
                segments
                    .contains(&locator.segment_id)
                    .then(|| (key.clone(), *locator))
            })
            .collect()
    }
}

/// True when the bounds describe a provably empty range.
///
/// `BTreeSet::range` panics on inverted bounds and on equal bounds that are
/// both excluded; callers passing arbitrary bounds must not hit either.
fn empty_bounds(lower: &Bound<&[u8]>, upper: &Bound<&[u8]>) -> bool {
    let (low, low_inclusive) = match lower {
        Bound::Unbounded => return false,
        Bound::Included(b) => (*b, true),
        Bound::Excluded(b) => (*b, false),
    };
    let (high, high_inclusive) = match upper {
        Bound::Unbounded => return false,
        Bound::Included(b) => (*b, true),
        Bound::Excluded(b) => (*b, false),
    };
    if low > high {
        return true;
    }
    low == high && !(low_inclusive && high_inclusive)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(segment: u64, offset: u64) -> Locator {
        Locator {
            segment_id: SegmentId::new(segment),
            offset,
            length: 32,
            timestamp: 0,
        }
    }

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn put_get_remove() {
        let mut dir = KeyDir::new();
        assert!(dir.get(b"a").is_none());

        assert!(dir.put(key("a"), locator(1, 0)).is_none());
        assert_eq!(dir.get(b"a"), Some(locator(1, 0)));
        assert_eq!(dir.len(), 1);

        let prior = dir.put(key("a"), locator(1, 40));
        assert_eq!(prior, Some(locator(1, 0)));
        assert_eq!(dir.get(b"a"), Some(locator(1, 40)));
        assert_eq!(dir.len(), 1);

        assert_eq!(dir.remove(b"a"), Some(locator(1, 40)));
        assert!(dir.get(b"a").is_none());
        assert!(dir.is_empty());
        assert!(dir.remove(b"a").is_none());
    }

    #[test]
    fn range_is_sorted_and_half_open() {
        let mut dir = KeyDir::new();
        for (i, k) in ["banana", "apple", "cherry", "avocado"].iter().enumerate() {
            dir.put(key(k), locator(1, i as u64 * 10));
        }

        let keys = dir.keys_in_range(Bound::Included(b"a"), Bound::Excluded(b"b"));
        assert_eq!(keys, vec![key("apple"), key("avocado")]);

        let all = dir.keys_in_range(Bound::Unbounded, Bound::Unbounded);
        assert_eq!(
            all,
            vec![key("apple"), key("avocado"), key("banana"), key("cherry")]
        );
    }

    #[test]
    fn ordered_index_tracks_removals() {
        let mut dir = KeyDir::new();
        dir.put(key("a"), locator(1, 0));
        dir.put(key("b"), locator(1, 10));
        dir.remove(b"a");

        let keys = dir.keys_in_range(Bound::Unbounded, Bound::Unbounded);
        assert_eq!(keys, vec![key("b")]);
    }

    #[test]
    fn degenerate_bounds_do_not_panic() {
        let mut dir = KeyDir::new();
        dir.put(key("m"), locator(1, 0));

        // Inverted.
        assert!(dir
            .keys_in_range(Bound::Included(b"z"), Bound::Excluded(b"a"))
            .is_empty());
        // Equal, both excluded.
        assert!(dir
            .keys_in_range(Bound::Excluded(b"m"), Bound::Excluded(b"m"))
            .is_empty());
        // Equal, both included: a point query.
        assert_eq!(
            dir.keys_in_range(Bound::Included(b"m"), Bound::Included(b"m")),
            vec![key("m")]
        );
        // Equal, half excluded.
        assert!(dir
            .keys_in_range(Bound::Included(b"m"), Bound::Excluded(b"m"))
            .is_empty());
    }

    #[test]
    fn entries_in_segments_filters_and_sorts() {
        let mut dir = KeyDir::new();
        dir.put(key("c"), locator(2, 0));
        dir.put(key("a"), locator(1, 0));
        dir.put(key("b"), locator(3, 0));
        dir.put(key("d"), locator(1, 50));

        let wanted: HashSet<SegmentId> = [SegmentId::new(1), SegmentId::new(2)].into();
        let entries = dir.entries_in_segments(&wanted);

        let keys: Vec<Bytes> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![key("a"), key("c"), key("d")]);
        assert_eq!(entries[0].1, locator(1, 0));
    }
}
