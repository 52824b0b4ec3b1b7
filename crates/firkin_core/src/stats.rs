//! Operation counters, cheap enough to keep on by default.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one store. All updates are relaxed; the numbers are
/// monotonic tallies, not a synchronization mechanism.
#[derive(Debug, Default)]
pub struct StoreStats {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    rotations: AtomicU64,
    compactions: AtomicU64,
    tail_truncations: AtomicU64,
}

impl StoreStats {
    pub(crate) fn record_read(&self, bytes: u64) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, bytes: u64) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_tail_truncation(&self) {
        self.tail_truncations.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            tail_truncations: self.tail_truncations.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Successful point lookups, hits and misses alike.
    pub reads: u64,
    /// Values appended.
    pub writes: u64,
    /// Tombstones appended.
    pub deletes: u64,
    /// Range scans started.
    pub scans: u64,
    /// Record bytes fetched by point lookups.
    pub bytes_read: u64,
    /// Record bytes appended, values and tombstones.
    pub bytes_written: u64,
    /// Active segment rotations.
    pub rotations: u64,
    /// Completed compactions.
    pub compactions: u64,
    /// Damaged tails dropped during recovery.
    pub tail_truncations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = StoreStats::default();
        stats.record_write(26);
        stats.record_write(30);
        stats.record_delete(21);
        stats.record_read(26);
        stats.record_scan();
        stats.record_rotation();

        let snap = stats.snapshot();
        assert_eq!(snap.writes, 2);
        assert_eq!(snap.deletes, 1);
        assert_eq!(snap.bytes_written, 77);
        assert_eq!(snap.reads, 1);
        assert_eq!(snap.bytes_read, 26);
        assert_eq!(snap.scans, 1);
        assert_eq!(snap.rotations, 1);
        assert_eq!(snap.compactions, 0);
    }
}
