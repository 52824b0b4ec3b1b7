//! # Firkin Core
//!
//! Log-structured key-value engine for Firkin.
//!
//! This crate provides:
//! - Append-only segment files with CRC-checked records
//! - An in-memory index mapping every key to its newest record
//! - Crash recovery by replay, tolerating a torn tail on the unsealed segment
//! - Compaction that merges sealed segments and drops dead records
//! - Ordered range scans over a sorted key snapshot
//!
//! ## Design Principles
//!
//! - Writes append, never overwrite; the newest record for a key wins
//! - A read costs one in-memory lookup plus one positioned file read
//! - Record timestamps are metadata; replay order alone decides freshness
//! - The registry file is the source of truth for which segments exist;
//!   files it does not list are deleted at open
//!
//! ## Example
//!
//! ```rust
//! use firkin_core::Store;
//!
//! # fn main() -> firkin_core::StoreResult<()> {
//! let dir = tempfile::tempdir()?;
//! let store = Store::open(dir.path())?;
//!
//! store.set("castle", "keep")?;
//! assert_eq!(store.get("castle")?.as_deref(), Some(&b"keep"[..]));
//!
//! store.delete("castle")?;
//! assert!(store.get("castle")?.is_none());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compactor;
mod config;
mod descriptor;
mod dir;
mod error;
mod keydir;
mod record;
mod registry;
mod segment;
mod stats;
mod store;
mod types;

/// Version of the engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use bytes::Bytes;
pub use compactor::CompactionStats;
pub use config::{Config, FlushPolicy};
pub use error::{StoreError, StoreResult};
pub use record::{Record, MAX_KEY_SIZE, MAX_VALUE_SIZE, RECORD_HEADER_SIZE, TOMBSTONE_SENTINEL};
pub use stats::StatsSnapshot;
pub use store::{RangeScan, SegmentInfo, Store, VerifyReport};
pub use types::SegmentId;
