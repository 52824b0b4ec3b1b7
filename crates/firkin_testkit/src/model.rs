//! Reference model for checking store behavior.
//!
//! Replays operation sequences against both a store and an in-memory
//! `BTreeMap`, asserting the two agree. The map is the ground truth for
//! latest-write-wins semantics, and its iteration order is the ground
//! truth for range scans.

use crate::generators::StoreOperation;
use firkin_core::Store;
use std::collections::BTreeMap;
use std::ops::Bound;

/// The expected live contents of a store.
#[derive(Debug, Default)]
pub struct ReferenceModel {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl ReferenceModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one operation to both the model and the store, asserting
    /// that anything the store reports agrees with the model.
    pub fn apply(&mut self, store: &Store, op: &StoreOperation) {
        match op {
            StoreOperation::Set { key, value } => {
                store.set(key.clone(), value.clone()).expect("set failed");
                self.entries.insert(key.clone(), value.clone());
            }
            StoreOperation::Delete { key } => {
                let removed = store.delete(key).expect("delete failed");
                let expected = self.entries.remove(key).is_some();
                assert_eq!(removed, expected, "delete of {key:?} disagrees with the model");
            }
            StoreOperation::Get { key } => {
                let actual = store.get(key).expect("get failed");
                assert_eq!(
                    actual.as_deref(),
                    self.entries.get(key).map(Vec::as_slice),
                    "get of {key:?} disagrees with the model"
                );
            }
            StoreOperation::Scan { start, end } => self.check_scan(store, start, end),
        }
    }

    /// Checks a range scan over `[start, end)` against the model.
    pub fn check_scan(&self, store: &Store, start: &[u8], end: &[u8]) {
        let actual = collect_scan(store, Bound::Included(start), Bound::Excluded(end));

        let expected: Vec<(Vec<u8>, Vec<u8>)> = if start <= end {
            self.entries
                .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            Vec::new()
        };

        assert_eq!(actual, expected, "scan over {start:?}..{end:?} disagrees");
    }

    /// Checks every model entry against the store, the live-key count, and
    /// the full ordered contents.
    pub fn verify_all(&self, store: &Store) {
        assert_eq!(store.len(), self.entries.len(), "live key count disagrees");
        for (key, value) in &self.entries {
            let actual = store.get(key).expect("get failed");
            assert_eq!(
                actual.as_deref(),
                Some(value.as_slice()),
                "value for {key:?} disagrees"
            );
        }

        let actual = collect_scan(store, Bound::Unbounded, Bound::Unbounded);
        let expected: Vec<(Vec<u8>, Vec<u8>)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(actual, expected, "full scan disagrees");
    }

    /// Number of live keys the model expects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the model expects no live keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn collect_scan(
    store: &Store,
    lower: Bound<&[u8]>,
    upper: Bound<&[u8]>,
) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut pairs = Vec::new();
    for pair in store.range_scan(lower, upper).expect("scan failed") {
        let (key, value) = pair.expect("scan entry failed");
        pairs.push((key.to_vec(), value.to_vec()));
    }
    pairs
}
