//! Verify command implementation.

use firkin_core::{Config, Store};
use std::path::Path;

/// Runs the verify command, re-reading every record in every segment.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open_with_config(path, Config::default().create_if_missing(false))?;

    println!("Verifying store at {}", path.display());

    match store.verify() {
        Ok(report) => {
            println!();
            println!("  Segments: {}", report.segments);
            println!(
                "  Records:  {} ({} tombstones)",
                report.records, report.tombstones
            );
            println!("  Bytes:    {}", report.bytes);
            println!();
            println!("✓ All record checksums valid");
            Ok(())
        }
        Err(e) => Err(format!("verification failed: {e}").into()),
    }
}
