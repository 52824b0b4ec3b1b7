//! # Firkin Testkit
//!
//! Test utilities for Firkin.
//!
//! This crate provides:
//! - Store fixtures with automatic cleanup and reopen helpers
//! - Property-based generators for keys, values, and operation sequences
//! - A `BTreeMap` reference model for checking store behavior
//! - File damage helpers for recovery and corruption tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use firkin_testkit::prelude::*;
//!
//! #[test]
//! fn survives_reopen() {
//!     let fixture = TestStore::open();
//!     fixture.set("k", "v").unwrap();
//!     let fixture = fixture.reopen();
//!     assert!(fixture.get("k").unwrap().is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod damage;
pub mod fixtures;
pub mod generators;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::damage::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
}

pub use damage::*;
pub use fixtures::*;
pub use generators::*;
pub use model::*;
