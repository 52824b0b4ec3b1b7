//! Store fixtures with automatic cleanup.
//!
//! Provides convenience wrappers for opening stores in temporary
//! directories and cycling them through close/reopen.

use firkin_core::{Config, FlushPolicy, Store};
use std::path::Path;
use tempfile::TempDir;

/// A store in a temporary directory with automatic cleanup.
///
/// The directory lives as long as the fixture, so a fixture can be torn
/// down and rebuilt over the same files with [`TestStore::reopen`].
pub struct TestStore {
    /// The open store.
    pub store: Store,
    temp_dir: TempDir,
}

impl TestStore {
    /// Opens a fresh store with the default configuration.
    pub fn open() -> Self {
        Self::with_config(Config::default())
    }

    /// Opens a fresh store with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let store =
            Store::open_with_config(temp_dir.path(), config).expect("failed to open store");
        Self { store, temp_dir }
    }

    /// Adopts an existing directory, keeping whatever files it holds.
    pub fn from_dir(temp_dir: TempDir, config: Config) -> Self {
        let store =
            Store::open_with_config(temp_dir.path(), config).expect("failed to reopen store");
        Self { store, temp_dir }
    }

    /// Closes the store and reopens it with the default configuration.
    ///
    /// Everything the store acknowledged before the close must still be
    /// readable afterwards.
    pub fn reopen(self) -> Self {
        self.reopen_with(Config::default())
    }

    /// Closes the store and reopens it with a different configuration.
    pub fn reopen_with(self, config: Config) -> Self {
        Self::from_dir(self.into_dir(), config)
    }

    /// Closes the store and hands back the directory for offline
    /// manipulation, typically to damage files before a reopen.
    pub fn into_dir(self) -> TempDir {
        let Self { store, temp_dir } = self;
        store.close().expect("failed to close store");
        drop(store);
        temp_dir
    }

    /// Path of the store directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Configuration with a tiny segment cap, so even short tests rotate
/// through several sealed segments. Syncs only on rotation to keep
/// write-heavy property tests fast; sealed files are still durable.
pub fn small_segment_config() -> Config {
    Config::default()
        .max_segment_size(256)
        .flush_policy(FlushPolicy::OnRotation)
}

/// Runs a test body against a fresh store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let fixture = TestStore::open();
    f(&fixture.store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use firkin_core::StoreError;

    #[test]
    fn fixture_round_trips_through_reopen() {
        let fixture = TestStore::open();
        fixture.set("name", "firkin").unwrap();

        let fixture = fixture.reopen();
        assert_eq!(fixture.get("name").unwrap().as_deref(), Some(&b"firkin"[..]));
    }

    #[test]
    fn small_segments_rotate_quickly() {
        let fixture = TestStore::with_config(small_segment_config());
        for i in 0..20 {
            fixture.set(format!("key-{i:02}"), vec![0u8; 64]).unwrap();
        }
        assert!(fixture.segments().len() > 1);
    }

    #[test]
    fn second_open_of_a_live_store_is_refused() {
        let fixture = TestStore::open();
        let err = Store::open(fixture.path()).unwrap_err();
        assert!(matches!(err, StoreError::StoreLocked));
    }

    #[test]
    fn with_temp_store_runs_the_body() {
        let count = with_temp_store(|store| {
            store.set("a", "1").unwrap();
            store.set("b", "2").unwrap();
            store.len()
        });
        assert_eq!(count, 2);
    }
}
