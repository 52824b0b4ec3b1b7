//! CLI command implementations.

pub mod compact;
pub mod inspect;
pub mod kv;
pub mod repl;
pub mod scan;
pub mod verify;

/// Renders raw key or value bytes for the terminal.
pub(crate) fn display_bytes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
