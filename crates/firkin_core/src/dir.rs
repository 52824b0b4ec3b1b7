//! Store directory management.
//!
//! File system layout:
//!
//! ```text
//! <store_path>/
//! ├─ REGISTRY           # Durable segment metadata
//! ├─ LOCK               # Advisory lock for single-process access
//! ├─ seg-000001-00.dat  # Sealed segment
//! └─ seg-000002-00.dat  # Active segment
//! ```
//!
//! The LOCK file ensures only one process opens the store at a time. The
//! REGISTRY file is saved atomically (write temp, fsync, rename, fsync
//! directory) and is the commit point for rotation and compaction.

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::registry::Registry;
use crate::types::SegmentId;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// File names within the store directory.
const REGISTRY_FILE: &str = "REGISTRY";
const LOCK_FILE: &str = "LOCK";
/// Temporary file for atomic registry writes.
const REGISTRY_TEMP: &str = "REGISTRY.tmp";
/// Segment file extension.
const SEGMENT_EXT: &str = ".dat";

/// Manages the store directory structure and file locking.
///
/// Holds an exclusive advisory lock on the directory for its whole
/// lifetime; only one `StoreDir` instance can exist per directory at a
/// time, across processes.
#[derive(Debug)]
pub struct StoreDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - A registry already exists and `error_if_exists` is true
    /// - Another process holds the lock (`StoreLocked`)
    /// - I/O errors
    pub fn open(path: &Path, config: &Config) -> StoreResult<Self> {
        if !path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StoreError::invalid_format(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(StoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        if config.error_if_exists && path.join(REGISTRY_FILE).exists() {
            return Err(StoreError::invalid_format(format!(
                "store already exists: {}",
                path.display()
            )));
        }

        // Acquire exclusive lock (non-blocking)
        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the REGISTRY file.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.path.join(REGISTRY_FILE)
    }

    /// The file name for a segment id at a given generation.
    #[must_use]
    pub fn segment_file_name(id: SegmentId, generation: u32) -> String {
        format!("seg-{:06}-{generation:02}{SEGMENT_EXT}", id.as_u64())
    }

    /// Full path of a segment file by name.
    #[must_use]
    pub fn segment_path(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }

    /// Loads the registry from disk.
    ///
    /// Returns `None` if the registry file doesn't exist (new store).
    pub fn load_registry(&self) -> StoreResult<Option<Registry>> {
        let registry_path = self.registry_path();

        if !registry_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&registry_path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if data.is_empty() {
            return Ok(None);
        }

        let registry = Registry::decode(&data)?;
        Ok(Some(registry))
    }

    /// Saves the registry to disk atomically.
    ///
    /// Write-then-rename for crash safety:
    /// 1. Write to a temporary file
    /// 2. Sync the temporary file
    /// 3. Rename over REGISTRY
    /// 4. Fsync the directory so the rename is durable
    pub fn save_registry(&self, registry: &Registry) -> StoreResult<()> {
        let registry_path = self.registry_path();
        let temp_path = self.path.join(REGISTRY_TEMP);

        let data = registry.encode();
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &registry_path)?;
        self.sync_directory()?;

        Ok(())
    }

    /// Creates an empty segment file and returns its path.
    ///
    /// The directory is fsynced so the new file's existence is durable.
    pub fn create_segment_file(&self, file_name: &str) -> StoreResult<PathBuf> {
        let segment_path = self.segment_path(file_name);
        File::create(&segment_path)?;
        self.sync_directory()?;
        Ok(segment_path)
    }

    /// Deletes segment files by name, returning how many existed.
    ///
    /// Used by compaction after a registry commit and by reconciliation at
    /// open. The directory is fsynced afterwards.
    pub fn delete_segment_files<S: AsRef<str>>(&self, file_names: &[S]) -> StoreResult<usize> {
        let mut deleted = 0;

        for name in file_names {
            let segment_path = self.segment_path(name.as_ref());
            if segment_path.exists() {
                fs::remove_file(&segment_path)?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            self.sync_directory()?;
        }

        Ok(deleted)
    }

    /// Names of all segment files currently on disk, in no particular order.
    pub fn list_segment_files(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if let Ok(name) = entry.file_name().into_string() {
                if name.starts_with("seg-") && name.ends_with(SEGMENT_EXT) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Syncs the store directory so metadata updates are durable.
    ///
    /// On Windows, directory fsync is not supported the way it is on Unix;
    /// NTFS journaling provides the metadata durability, so this is a no-op
    /// there.
    #[cfg(unix)]
    fn sync_directory(&self) -> StoreResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SegmentMeta;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let store_path = temp.path().join("new_store");

        assert!(!store_path.exists());

        let dir = StoreDir::open(&store_path, &Config::default()).unwrap();
        assert!(store_path.exists());
        assert!(store_path.is_dir());

        drop(dir);
    }

    #[test]
    fn open_fails_if_not_exists_and_no_create() {
        let temp = tempdir().unwrap();
        let store_path = temp.path().join("nonexistent");

        let config = Config::new().create_if_missing(false);
        assert!(StoreDir::open(&store_path, &config).is_err());
    }

    #[test]
    fn error_if_exists_respected() {
        let temp = tempdir().unwrap();
        let store_path = temp.path().join("existing");

        let dir = StoreDir::open(&store_path, &Config::default()).unwrap();
        dir.save_registry(&Registry::new()).unwrap();
        drop(dir);

        let config = Config::new().error_if_exists(true);
        assert!(StoreDir::open(&store_path, &config).is_err());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let store_path = temp.path().join("locked");

        let _dir1 = StoreDir::open(&store_path, &Config::default()).unwrap();

        let result = StoreDir::open(&store_path, &Config::default());
        assert!(matches!(result, Err(StoreError::StoreLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let store_path = temp.path().join("reopen");

        {
            let _dir = StoreDir::open(&store_path, &Config::default()).unwrap();
        }

        let _dir2 = StoreDir::open(&store_path, &Config::default()).unwrap();
    }

    #[test]
    fn registry_round_trip() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(&temp.path().join("reg"), &Config::default()).unwrap();

        assert!(dir.load_registry().unwrap().is_none());

        let mut registry = Registry::new();
        let id = registry.allocate_id();
        registry.insert(SegmentMeta {
            id,
            generation: 0,
            file_name: StoreDir::segment_file_name(id, 0),
            created_at: 1_700_000_000,
            sealed: false,
        });
        dir.save_registry(&registry).unwrap();

        let loaded = dir.load_registry().unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            loaded.get(id).unwrap().file_name,
            "seg-000001-00.dat".to_string()
        );
    }

    #[test]
    fn segment_file_naming() {
        assert_eq!(
            StoreDir::segment_file_name(SegmentId::new(7), 0),
            "seg-000007-00.dat"
        );
        assert_eq!(
            StoreDir::segment_file_name(SegmentId::new(3), 12),
            "seg-000003-12.dat"
        );
    }

    #[test]
    fn create_list_delete_segment_files() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(&temp.path().join("files"), &Config::default()).unwrap();

        dir.create_segment_file("seg-000001-00.dat").unwrap();
        dir.create_segment_file("seg-000002-00.dat").unwrap();

        let mut names = dir.list_segment_files().unwrap();
        names.sort();
        assert_eq!(names, vec!["seg-000001-00.dat", "seg-000002-00.dat"]);

        let deleted = dir.delete_segment_files(&["seg-000001-00.dat"]).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(dir.list_segment_files().unwrap(), vec!["seg-000002-00.dat"]);

        // Deleting a missing file is not an error.
        let deleted = dir.delete_segment_files(&["seg-000009-00.dat"]).unwrap();
        assert_eq!(deleted, 0);
    }
}
