//! Error types for the firkin storage engine.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in firkin store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record ended before its declared length.
    ///
    /// Tolerated only at the tail of the unsealed segment during recovery,
    /// where the damaged suffix is truncated away. Anywhere else this is
    /// treated as corruption.
    #[error("truncated record: needed {needed} bytes, only {available} available")]
    TruncatedRecord {
        /// Bytes the record header requires.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// A record's framing is damaged.
    #[error("corrupt record: {message}")]
    CorruptRecord {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Key exceeds the maximum encodable size.
    #[error("key too large: {size} bytes exceeds maximum {max}")]
    KeyTooLarge {
        /// Size of the offending key.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Value exceeds the maximum encodable size.
    #[error("value too large: {size} bytes exceeds maximum {max}")]
    ValueTooLarge {
        /// Size of the offending value.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The descriptor table could not produce a handle for a segment.
    ///
    /// Under correct sequencing the keydir never points at a segment the
    /// descriptor table does not know, so callers retry the lookup once
    /// before surfacing this.
    #[error("segment {segment_id} unavailable")]
    SegmentUnavailable {
        /// Id of the missing segment.
        segment_id: u64,
    },

    /// Store directory is already locked by another process.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// Store has been closed.
    #[error("store is closed")]
    StoreClosed,

    /// Invalid registry format or version.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Configuration rejected at open.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

impl StoreError {
    /// Creates a corrupt record error.
    pub fn corrupt_record(message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            message: message.into(),
        }
    }

    /// Creates a truncated record error.
    pub fn truncated_record(needed: usize, available: usize) -> Self {
        Self::TruncatedRecord { needed, available }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// True if this error means a record was cut short rather than damaged.
    #[must_use]
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::TruncatedRecord { .. })
    }

    /// True for errors caused by bad bytes in a segment file, as opposed to
    /// environment failures like io errors.
    ///
    /// Recovery tolerates data damage at the tail of the unsealed segment
    /// by truncating it; anywhere else it fails the open.
    #[must_use]
    pub fn is_data_damage(&self) -> bool {
        matches!(
            self,
            Self::TruncatedRecord { .. } | Self::CorruptRecord { .. } | Self::ChecksumMismatch { .. }
        )
    }
}
