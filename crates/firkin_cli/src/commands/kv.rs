//! Point operation commands: set, get, del.

use firkin_core::{Config, Store};
use std::path::Path;

/// Runs the set command, creating the store if it does not exist yet.
pub fn set(path: &Path, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(path)?;
    store.set(key.as_bytes().to_vec(), value.as_bytes().to_vec())?;
    store.close()?;
    println!("OK");
    Ok(())
}

/// Runs the get command.
pub fn get(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open_with_config(path, Config::default().create_if_missing(false))?;
    match store.get(key)? {
        Some(value) => println!("{}", super::display_bytes(&value)),
        None => println!("(not found)"),
    }
    Ok(())
}

/// Runs the del command.
pub fn del(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open_with_config(path, Config::default().create_if_missing(false))?;
    if store.delete(key)? {
        println!("Deleted {key}");
    } else {
        println!("(not found)");
    }
    store.close()?;
    Ok(())
}
