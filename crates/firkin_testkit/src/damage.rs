//! File damage helpers for recovery and corruption tests.
//!
//! These operate on a closed store directory, reproducing the on-disk
//! states a crash can leave behind: torn final records, stray bytes past
//! the last append, or flipped bits from a bad disk.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Returns every segment data file in the directory, oldest first.
///
/// Segment ids are zero-padded in file names, so the lexicographic order
/// is the id order.
pub fn segment_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .expect("failed to read store directory")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "dat"))
        .collect();
    files.sort();
    files
}

/// Returns the newest segment file, the one holding the log tail.
pub fn newest_segment_file(dir: &Path) -> PathBuf {
    segment_files(dir)
        .pop()
        .expect("store directory has no segment files")
}

/// Cuts `n` bytes off the end of a file, as a torn write would.
pub fn truncate_tail(path: &Path, n: u64) {
    let len = fs::metadata(path).expect("failed to stat file").len();
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .expect("failed to open file for truncation");
    file.set_len(len.saturating_sub(n))
        .expect("failed to truncate file");
}

/// Appends raw bytes past the end of a file.
pub fn append_garbage(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("failed to open file for append");
    file.write_all(bytes).expect("failed to append garbage");
}

/// Inverts the byte at `offset`, leaving the file length unchanged.
pub fn flip_byte(path: &Path, offset: u64) {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .expect("failed to open file for byte flip");

    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).expect("seek failed");
    file.read_exact(&mut byte).expect("read failed");

    byte[0] = !byte[0];
    file.seek(SeekFrom::Start(offset)).expect("seek failed");
    file.write_all(&byte).expect("write failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{small_segment_config, TestStore};
    use firkin_core::{Config, Store, StoreError};
    use proptest::prelude::*;

    /// Three records with known sizes: 21, 21, and 50 bytes.
    fn seed_three_records(fixture: &TestStore) {
        fixture.set("k1", "one").unwrap();
        fixture.set("k2", "two").unwrap();
        fixture.set("k3", vec![0x33u8; 32]).unwrap();
    }

    #[test]
    fn garbage_past_the_last_record_is_discarded() {
        let fixture = TestStore::open();
        seed_three_records(&fixture);

        let dir = fixture.into_dir();
        append_garbage(&newest_segment_file(dir.path()), &[0xAB; 7]);

        let fixture = TestStore::from_dir(dir, Config::default());
        assert_eq!(fixture.len(), 3);
        assert_eq!(fixture.get("k3").unwrap().as_deref(), Some(&[0x33u8; 32][..]));

        // The tail is clean again, so appends continue where the data ends.
        fixture.set("k4", "four").unwrap();
        assert_eq!(fixture.len(), 4);
    }

    #[test]
    fn flipped_byte_in_the_unsealed_tail_drops_only_that_record() {
        let fixture = TestStore::open();
        seed_three_records(&fixture);

        // Third record spans offsets 42..92; offset 60 is inside its value.
        let dir = fixture.into_dir();
        flip_byte(&newest_segment_file(dir.path()), 60);

        let fixture = TestStore::from_dir(dir, Config::default());
        assert_eq!(fixture.len(), 2);
        assert_eq!(fixture.get("k1").unwrap().as_deref(), Some(&b"one"[..]));
        assert!(fixture.get("k3").unwrap().is_none());
        fixture.verify().unwrap();
    }

    #[test]
    fn damage_in_a_sealed_segment_fails_the_open() {
        let fixture = TestStore::with_config(small_segment_config());
        for i in 0..8 {
            fixture.set(format!("key-{i:02}"), vec![0u8; 64]).unwrap();
        }
        assert!(fixture.segments().iter().any(|s| s.sealed));

        // Offset 20 is inside the first record's key, so the checksum no
        // longer matches and the damage is not at a truncatable tail.
        let dir = fixture.into_dir();
        flip_byte(&segment_files(dir.path())[0], 20);

        let err = Store::open_with_config(dir.path(), small_segment_config()).unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
    }

    proptest! {
        #[test]
        fn torn_final_record_never_touches_earlier_keys(cut in 1u64..50) {
            let fixture = TestStore::open();
            seed_three_records(&fixture);

            let dir = fixture.into_dir();
            truncate_tail(&newest_segment_file(dir.path()), cut);

            let fixture = TestStore::from_dir(dir, Config::default());
            prop_assert_eq!(fixture.len(), 2);
            let k1 = fixture.get("k1").unwrap();
            prop_assert_eq!(k1.as_deref(), Some(&b"one"[..]));
            let k2 = fixture.get("k2").unwrap();
            prop_assert_eq!(k2.as_deref(), Some(&b"two"[..]));
            prop_assert!(fixture.get("k3").unwrap().is_none());
        }
    }
}
