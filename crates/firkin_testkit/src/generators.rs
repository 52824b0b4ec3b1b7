//! Property-based generators using proptest.
//!
//! Keys are drawn from a deliberately small alphabet so random sequences
//! revisit keys often, exercising overwrites, deletes of live keys, and
//! tombstone handling rather than write-once churn.

use proptest::prelude::*;

/// Strategy for store keys: short strings over a small alphabet.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::string::string_regex("[a-h]{1,4}")
        .expect("invalid key regex")
        .prop_map(String::into_bytes)
}

/// Strategy for arbitrary binary keys.
pub fn raw_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..64)
}

/// Strategy for values: arbitrary bytes, empty included.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// A single store operation for randomized sequences.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Write a value under a key.
    Set {
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Delete a key.
    Delete {
        /// Key bytes.
        key: Vec<u8>,
    },
    /// Read a key.
    Get {
        /// Key bytes.
        key: Vec<u8>,
    },
    /// Scan the half-open key range `[start, end)`.
    Scan {
        /// Inclusive lower bound.
        start: Vec<u8>,
        /// Exclusive upper bound, never below `start`.
        end: Vec<u8>,
    },
}

/// Strategy for a single operation, weighted towards writes.
pub fn operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        4 => (key_strategy(), value_strategy())
            .prop_map(|(key, value)| StoreOperation::Set { key, value }),
        2 => key_strategy().prop_map(|key| StoreOperation::Delete { key }),
        2 => key_strategy().prop_map(|key| StoreOperation::Get { key }),
        1 => (key_strategy(), key_strategy()).prop_map(|(a, b)| {
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            StoreOperation::Scan { start, end }
        }),
    ]
}

/// Strategy for a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(operation_strategy(), min_ops..max_ops)
}

/// Proptest configuration for store suites. Fewer cases than the proptest
/// default because every case opens files on disk.
pub fn store_proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    }
}
