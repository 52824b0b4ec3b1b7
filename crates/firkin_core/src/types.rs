//! Core type definitions for firkin.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a segment file.
///
/// Fresh active segments receive monotonically increasing ids starting at 1.
/// Compaction outputs reuse the highest id of their inputs (with a bumped
/// file generation), so ascending id order is always replay order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl SegmentId {
    /// Creates a new segment ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next segment ID.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}

/// Current wall-clock time as whole seconds since the Unix epoch.
///
/// Record timestamps are metadata for operators; nothing in recovery or
/// conflict resolution orders by them. Saturates instead of failing on a
/// clock before the epoch or after 2106.
#[must_use]
pub fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .min(u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_id_ordering() {
        let s1 = SegmentId::new(1);
        let s2 = SegmentId::new(2);
        assert!(s1 < s2);
        assert_eq!(s1.next(), s2);
    }

    #[test]
    fn segment_id_display() {
        assert_eq!(SegmentId::new(7).to_string(), "seg:7");
    }

    #[test]
    fn timestamp_is_sane() {
        // 2024-01-01 as a floor; u32 holds until 2106.
        assert!(unix_timestamp() > 1_704_067_200);
    }
}
