//! Scan command implementation.

use super::display_bytes;
use firkin_core::{Config, Store};
use std::ops::Bound;
use std::path::Path;

/// Runs the scan command, printing one tab-separated pair per line.
pub fn run(
    path: &Path,
    start: Option<&str>,
    end: Option<&str>,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open_with_config(path, Config::default().create_if_missing(false))?;

    let lower = match start {
        Some(key) => Bound::Included(key.as_bytes()),
        None => Bound::Unbounded,
    };
    let upper = match end {
        Some(key) => Bound::Excluded(key.as_bytes()),
        None => Bound::Unbounded,
    };

    let mut printed = 0usize;
    for pair in store.range_scan(lower, upper)? {
        let (key, value) = pair?;
        println!("{}\t{}", display_bytes(&key), display_bytes(&value));
        printed += 1;
        if limit.is_some_and(|l| printed >= l) {
            break;
        }
    }

    Ok(())
}
