//! Interactive session against a store.

use super::display_bytes;
use firkin_core::Store;
use std::io::{self, BufRead, Write};
use std::ops::Bound;
use std::path::Path;

/// Runs the repl command. The store stays open for the whole session, so
/// repeated operations skip the per-command open and replay cost.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(path)?;
    println!("Firkin v{} at {}", env!("CARGO_PKG_VERSION"), path.display());
    println!("Type 'help' for commands, 'quit' to leave.");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("firkin> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match execute(&store, line) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => println!("error: {e}"),
        }
    }

    store.close()?;
    Ok(())
}

/// Executes one line. Returns `true` when the session should end.
fn execute(store: &Store, line: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or("");

    match command {
        "set" => {
            // The value is everything after the key, spaces included.
            let rest = line.strip_prefix("set").unwrap_or("").trim_start();
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .ok_or("usage: set <key> <value>")?;
            store.set(key.to_owned(), value.trim_start().to_owned())?;
            println!("OK");
        }
        "get" => {
            let key = words.next().ok_or("usage: get <key>")?;
            match store.get(key)? {
                Some(value) => println!("{}", display_bytes(&value)),
                None => println!("(not found)"),
            }
        }
        "del" => {
            let key = words.next().ok_or("usage: del <key>")?;
            if store.delete(key)? {
                println!("OK");
            } else {
                println!("(not found)");
            }
        }
        "scan" => {
            let start = words.next();
            let end = words.next();
            let lower = match start {
                Some(key) => Bound::Included(key.as_bytes()),
                None => Bound::Unbounded,
            };
            let upper = match end {
                Some(key) => Bound::Excluded(key.as_bytes()),
                None => Bound::Unbounded,
            };

            let mut count = 0usize;
            for pair in store.range_scan(lower, upper)? {
                let (key, value) = pair?;
                println!("{}\t{}", display_bytes(&key), display_bytes(&value));
                count += 1;
            }
            println!("({count} pairs)");
        }
        "compact" => {
            let stats = store.compact()?;
            println!(
                "merged {} segments, reclaimed {} bytes",
                stats.segments_in,
                stats.bytes_reclaimed()
            );
        }
        "stats" => {
            let snap = store.stats();
            println!("keys: {}", store.len());
            println!(
                "writes: {}  reads: {}  deletes: {}  scans: {}",
                snap.writes, snap.reads, snap.deletes, snap.scans
            );
            println!(
                "bytes written: {}  bytes read: {}",
                snap.bytes_written, snap.bytes_read
            );
            println!(
                "rotations: {}  compactions: {}",
                snap.rotations, snap.compactions
            );
        }
        "help" => print_help(),
        "quit" | "exit" => return Ok(true),
        other => return Err(format!("unknown command '{other}' (try 'help')").into()),
    }

    Ok(false)
}

fn print_help() {
    println!("Commands:");
    println!("  set <key> <value>   write a value");
    println!("  get <key>           read a value");
    println!("  del <key>           delete a key");
    println!("  scan [start] [end]  list pairs, start inclusive, end exclusive");
    println!("  compact             merge sealed segments");
    println!("  stats               operation counters");
    println!("  help                this text");
    println!("  quit                leave");
}
