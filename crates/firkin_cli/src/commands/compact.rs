//! Compact command implementation.

use firkin_core::{Config, Store};
use std::path::Path;
use tracing::info;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Compacting store at {:?}", path);
    let store = Store::open_with_config(path, Config::default().create_if_missing(false))?;

    println!("Compacting store at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let sealed: Vec<_> = store.segments().into_iter().filter(|s| s.sealed).collect();
    let sealed_bytes: u64 = sealed.iter().map(|s| s.size).sum();

    if dry_run {
        println!("Sealed segments: {} ({} bytes)", sealed.len(), sealed_bytes);
        println!(
            "Compaction is {}",
            if store.needs_compaction() {
                "recommended"
            } else {
                "not yet needed"
            }
        );
        return Ok(());
    }

    let stats = store.compact()?;

    println!("Compaction Results:");
    println!("  Segments merged: {}", stats.segments_in);
    println!("  Records copied:  {}", stats.records_copied);
    println!();
    println!("  Size before: {} bytes", stats.bytes_in);
    println!("  Size after:  {} bytes", stats.bytes_out);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        stats.bytes_reclaimed(),
        if stats.bytes_in > 0 {
            (stats.bytes_reclaimed() as f64 / stats.bytes_in as f64) * 100.0
        } else {
            0.0
        }
    );

    store.close()?;
    Ok(())
}
