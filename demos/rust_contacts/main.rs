//! Basic Firkin Example - Contact Book
//!
//! This example demonstrates core Firkin functionality:
//! - Opening a store and writing key/value pairs
//! - Point lookups and ordered prefix scans
//! - Overwrites, deletes, and reclaiming space with compaction
//! - Closing and reopening a store to recover its contents
//!
//! Run with: cargo run -p rust_contacts

use firkin_core::{Config, Store};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Contact Book Example");
    println!("====================\n");

    // A small segment cap so this short walkthrough rotates through
    // several segment files and has something to compact.
    let dir = tempfile::tempdir()?;
    let config = Config::default().max_segment_size(128);
    let store = Store::open_with_config(dir.path(), config.clone())?;
    println!("[OK] Store opened at {}", dir.path().display());

    // Keys share a "contact/" prefix so one range scan lists the book.
    let contacts = [
        ("contact/alice", "alice@example.com"),
        ("contact/bob", "bob@example.com"),
        ("contact/carol", "carol@example.com"),
        ("contact/dave", "dave@example.com"),
    ];

    println!("\n[+] Inserting {} contacts...", contacts.len());
    for (key, email) in contacts {
        store.set(key, email)?;
    }
    println!("[OK] {} live keys in {} segment files", store.len(), store.segments().len());

    // "contact0" is the first key past the "contact/" prefix.
    println!("\n[*] All contacts:");
    for pair in store.scan("contact/", "contact0")? {
        let (key, value) = pair?;
        println!(
            "  {} -> {}",
            String::from_utf8_lossy(&key),
            String::from_utf8_lossy(&value)
        );
    }

    if let Some(email) = store.get("contact/carol")? {
        println!("\n[*] Carol's address: {}", String::from_utf8_lossy(&email));
    }

    // Overwrites append a new record; the newest value wins.
    println!("\n[~] Updating bob's address...");
    store.set("contact/bob", "bob@newjob.example")?;

    println!("\n[-] Removing dave...");
    if store.delete("contact/dave")? {
        println!("[OK] dave removed");
    }

    // Compaction merges the sealed segments, dropping bob's old address
    // and dave's records entirely.
    println!("\n[#] Compacting...");
    let stats = store.compact()?;
    println!(
        "[OK] {} segments merged, {} records kept, {} bytes reclaimed",
        stats.segments_in,
        stats.records_copied,
        stats.bytes_reclaimed()
    );
    println!("[OK] {} segment files remain", store.segments().len());

    // Close cleanly, then reopen from the same directory.
    store.close()?;
    drop(store);

    let store = Store::open_with_config(dir.path(), config)?;
    println!("\n[OK] Reopened: {} contacts recovered", store.len());

    println!("\n[*] Final contact book:");
    for pair in store.scan("contact/", "contact0")? {
        let (key, value) = pair?;
        println!(
            "  ✓ {} -> {}",
            String::from_utf8_lossy(&key),
            String::from_utf8_lossy(&value)
        );
    }

    store.close()?;
    println!("\n[*] Store closed");

    Ok(())
}
