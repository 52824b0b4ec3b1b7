//! The store facade: open, read, write, scan, compact, close.
//!
//! ## Locking
//!
//! Four locks, always taken in a fixed order so no pair can deadlock:
//!
//! - `active` (mutex): the writer path. Held across the keydir update so
//!   index order matches append order.
//! - `registry` (mutex): segment metadata. Taken inside `active` during
//!   rotation.
//! - `keydir` (rwlock): the index. Readers take it briefly and drop it
//!   before touching files.
//! - `compaction` (mutex): serializes compaction runs.
//!
//! Order: `active` before `registry`, `active` before `keydir`, `keydir`
//! before the descriptor table's internal lock. Compaction takes `keydir`
//! and `registry` but never `active`, so writes proceed while it runs.
//!
//! ## Recovery
//!
//! Opening reconciles the directory against the registry (orphan files are
//! deleted, entries without a file are dropped with a warning), then
//! replays every registered segment in ascending id order to rebuild the
//! index. Damage at the tail of the unsealed segment is cut off and the
//! store opens; damage anywhere else fails the open.

use crate::compactor::{CompactionStats, Compactor};
use crate::config::Config;
use crate::descriptor::DescriptorTable;
use crate::dir::StoreDir;
use crate::error::{StoreError, StoreResult};
use crate::keydir::{KeyDir, Locator};
use crate::record::Record;
use crate::registry::{Registry, SegmentMeta};
use crate::segment::{truncate_segment, ActiveSegment, SegmentScanner};
use crate::stats::{StatsSnapshot, StoreStats};
use crate::types::{unix_timestamp, SegmentId};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// An embedded key-value store backed by append-only segment files.
///
/// All methods take `&self`; wrap the store in an `Arc` to share it across
/// threads. Reads run concurrently; writes serialize on the active
/// segment.
pub struct Store {
    dir: StoreDir,
    config: Config,
    keydir: RwLock<KeyDir>,
    registry: Mutex<Registry>,
    active: Mutex<ActiveSegment>,
    descriptors: DescriptorTable,
    stats: StoreStats,
    compaction: Mutex<()>,
    closed: AtomicBool,
}

impl Store {
    /// Opens a store at `path` with the default configuration.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a store at `path`, creating it according to `config`.
    ///
    /// Rebuilds the in-memory index by replaying every registered segment.
    /// A damaged tail on the unsealed segment is truncated away; damage in
    /// a sealed segment fails the open.
    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> StoreResult<Self> {
        let started = std::time::Instant::now();
        config.validate()?;
        let dir = StoreDir::open(path.as_ref(), &config)?;
        let mut registry = dir.load_registry()?.unwrap_or_else(Registry::new);

        // Reconcile disk with the registry before trusting either. Files
        // the registry does not know about are half-finished segments from
        // an interrupted compaction or rotation; replaying them could
        // resurrect stale values.
        let on_disk: HashSet<String> = dir.list_segment_files()?.into_iter().collect();
        let registered: HashSet<String> =
            registry.iter().map(|meta| meta.file_name.clone()).collect();

        let orphans: Vec<String> = on_disk.difference(&registered).cloned().collect();
        if !orphans.is_empty() {
            warn!(count = orphans.len(), "deleting orphan segment files");
            dir.delete_segment_files(&orphans)?;
        }

        let missing: Vec<SegmentId> = registry
            .iter()
            .filter(|meta| !on_disk.contains(&meta.file_name))
            .map(|meta| meta.id)
            .collect();
        for id in missing {
            warn!(segment = %id, "registered segment has no file, dropping entry");
            registry.remove(id);
        }

        let descriptors = DescriptorTable::new(config.descriptor_pool_size);
        let stats = StoreStats::default();
        let mut keydir = KeyDir::new();

        // Replay in ascending id order; the last record wins, so the index
        // ends up pointing at the freshest copy of every key.
        let metas: Vec<SegmentMeta> = registry.iter().cloned().collect();
        for meta in &metas {
            let path = dir.segment_path(&meta.file_name);
            descriptors.register(meta.id, path.clone());

            let mut scanner = SegmentScanner::open(&path)?;
            loop {
                match scanner.next_record() {
                    Ok(Some((offset, record))) => {
                        if record.is_tombstone() {
                            keydir.remove(&record.key);
                        } else {
                            let locator = Locator {
                                segment_id: meta.id,
                                offset,
                                length: record.encoded_len() as u32,
                                timestamp: record.timestamp,
                            };
                            keydir.put(record.key.clone(), locator);
                        }
                    }
                    Ok(None) => break,
                    Err(e) if !meta.sealed && e.is_data_damage() => {
                        let keep = scanner.offset();
                        warn!(
                            segment = %meta.id,
                            offset = keep,
                            error = %e,
                            "truncating damaged tail of unsealed segment"
                        );
                        drop(scanner);
                        truncate_segment(&path, keep)?;
                        stats.record_tail_truncation();
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        // The unsealed segment reopens for appends; without one, start
        // fresh above every id ever handed out.
        let reopen = registry.last().filter(|meta| !meta.sealed).cloned();
        let active = match reopen {
            Some(meta) => {
                debug!(segment = %meta.id, "reopening unsealed segment for appends");
                ActiveSegment::open(
                    meta.id,
                    dir.segment_path(&meta.file_name),
                    config.flush_policy,
                )?
            }
            None => {
                let id = registry.allocate_id();
                let file_name = StoreDir::segment_file_name(id, 0);
                let path = dir.create_segment_file(&file_name)?;
                registry.insert(SegmentMeta {
                    id,
                    generation: 0,
                    file_name,
                    created_at: u64::from(unix_timestamp()),
                    sealed: false,
                });
                ActiveSegment::open(id, path, config.flush_policy)?
            }
        };
        descriptors.register(active.id(), active.path().to_path_buf());
        descriptors.pin_active(active.id());

        dir.save_registry(&registry)?;

        info!(
            path = %dir.path().display(),
            segments = registry.len(),
            keys = keydir.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "store opened"
        );

        Ok(Self {
            dir,
            config,
            keydir: RwLock::new(keydir),
            registry: Mutex::new(registry),
            active: Mutex::new(active),
            descriptors,
            stats,
            compaction: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// Returns once the record is appended; with
    /// [`FlushPolicy::EveryWrite`](crate::config::FlushPolicy::EveryWrite)
    /// it is also durable.
    pub fn set(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> StoreResult<()> {
        self.ensure_open()?;
        let key = key.into();
        let record = Record::put(key.clone(), value.into(), unix_timestamp());
        let bytes = record.encode()?;

        {
            let mut active = self.active.lock();
            let offset = active.append(&bytes)?;
            let segment_id = active.id();

            // Index before the rotation check. Sealing makes the segment
            // eligible for compaction, which trusts the index to name every
            // live record in it.
            self.keydir.write().put(
                key,
                Locator {
                    segment_id,
                    offset,
                    length: bytes.len() as u32,
                    timestamp: record.timestamp,
                },
            );
            self.maybe_rotate(&mut active)?;
        }

        self.stats.record_write(bytes.len() as u64);
        Ok(())
    }

    /// Returns the current value for `key`, or `None`.
    pub fn get(&self, key: impl AsRef<[u8]>) -> StoreResult<Option<Bytes>> {
        match self.lookup(key.as_ref())? {
            Some((locator, value)) => {
                self.stats.record_read(u64::from(locator.length));
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Deletes `key`. Returns whether it was present.
    ///
    /// A tombstone is appended either way; deleting an absent key is a
    /// durable no-op.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> StoreResult<bool> {
        self.ensure_open()?;
        let key = key.as_ref();
        let record = Record::tombstone(Bytes::copy_from_slice(key), unix_timestamp());
        let bytes = record.encode()?;

        let mut active = self.active.lock();
        active.append(&bytes)?;
        let was_present = self.keydir.write().remove(key).is_some();
        self.maybe_rotate(&mut active)?;
        drop(active);

        self.stats.record_delete(bytes.len() as u64);
        Ok(was_present)
    }

    /// Iterates keys in `[lower, upper]` per the given bounds, in ascending
    /// key order.
    ///
    /// The key set is snapshotted up front; values are fetched lazily as
    /// the iterator advances. Keys deleted after the snapshot are skipped,
    /// and a value overwritten mid-scan is served in its newest version.
    pub fn range_scan(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
    ) -> StoreResult<RangeScan<'_>> {
        self.ensure_open()?;
        let keys = self.keydir.read().keys_in_range(lower, upper);
        self.stats.record_scan();
        Ok(RangeScan {
            store: self,
            keys: keys.into_iter(),
        })
    }

    /// Iterates keys in the half-open range `[start, end)`.
    pub fn scan(
        &self,
        start: impl AsRef<[u8]>,
        end: impl AsRef<[u8]>,
    ) -> StoreResult<RangeScan<'_>> {
        self.range_scan(Bound::Included(start.as_ref()), Bound::Excluded(end.as_ref()))
    }

    /// Merges all sealed segments into one, dropping overwritten values and
    /// tombstones, then deletes the inputs.
    ///
    /// Runs are serialized; a second caller blocks until the first
    /// finishes. Reads and writes proceed concurrently.
    pub fn compact(&self) -> StoreResult<CompactionStats> {
        self.ensure_open()?;
        let _running = self.compaction.lock();
        Compactor {
            dir: &self.dir,
            keydir: &self.keydir,
            registry: &self.registry,
            descriptors: &self.descriptors,
            stats: &self.stats,
        }
        .run()
    }

    /// Whether the sealed-segment count has reached the configured
    /// compaction threshold.
    #[must_use]
    pub fn needs_compaction(&self) -> bool {
        self.registry.lock().sealed_ids().len() >= self.config.compaction_threshold
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keydir.read().len()
    }

    /// Whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keydir.read().is_empty()
    }

    /// The store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Point-in-time operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Metadata and on-disk size for every registered segment, in id order.
    pub fn segments(&self) -> Vec<SegmentInfo> {
        let registry = self.registry.lock();
        registry
            .iter()
            .map(|meta| SegmentInfo {
                id: meta.id,
                generation: meta.generation,
                file_name: meta.file_name.clone(),
                sealed: meta.sealed,
                size: std::fs::metadata(self.dir.segment_path(&meta.file_name))
                    .map(|m| m.len())
                    .unwrap_or(0),
            })
            .collect()
    }

    /// Re-reads and checksums every record in every registered segment.
    ///
    /// Fails on the first damaged record. Safe to run on a live store;
    /// records appended after the scan starts are not visited.
    pub fn verify(&self) -> StoreResult<VerifyReport> {
        self.ensure_open()?;
        let metas: Vec<SegmentMeta> = self.registry.lock().iter().cloned().collect();

        let mut report = VerifyReport::default();
        for meta in &metas {
            let mut scanner = SegmentScanner::open(&self.dir.segment_path(&meta.file_name))?;
            while let Some((_, record)) = scanner.next_record()? {
                report.records += 1;
                if record.is_tombstone() {
                    report.tombstones += 1;
                }
            }
            report.bytes += scanner.total_size();
            report.segments += 1;
        }
        Ok(report)
    }

    /// Flushes the active segment, persists the registry, and drops the
    /// pooled read handles.
    ///
    /// Every later operation fails with [`StoreError::StoreClosed`].
    /// Closing twice is fine. Dropping the store closes it implicitly.
    pub fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut active = self.active.lock();
        active.sync()?;
        let registry = self.registry.lock();
        self.dir.save_registry(&registry)?;
        self.descriptors.release_handles();
        debug!("store closed");
        Ok(())
    }

    /// Looks a key up and reads its record, retrying once if the segment
    /// was compacted away between the index lookup and the file read.
    fn lookup(&self, key: &[u8]) -> StoreResult<Option<(Locator, Bytes)>> {
        self.ensure_open()?;
        let Some(locator) = self.keydir.read().get(key) else {
            return Ok(None);
        };
        match self.read_value(key, locator) {
            Ok(value) => Ok(Some((locator, value))),
            Err(StoreError::SegmentUnavailable { .. }) => {
                let Some(locator) = self.keydir.read().get(key) else {
                    return Ok(None);
                };
                Ok(Some((locator, self.read_value(key, locator)?)))
            }
            Err(e) => Err(e),
        }
    }

    fn read_value(&self, key: &[u8], locator: Locator) -> StoreResult<Bytes> {
        let handle = self.descriptors.acquire(locator.segment_id)?;
        let bytes = handle.read_exact_at(locator.offset, locator.length as usize)?;
        let record = Record::decode(&bytes)?;

        if record.key.as_ref() != key {
            return Err(StoreError::corrupt_record(format!(
                "segment {} offset {} holds a different key than indexed",
                locator.segment_id, locator.offset
            )));
        }
        match record.value {
            Some(value) => Ok(value),
            None => Err(StoreError::corrupt_record(format!(
                "segment {} offset {} holds a tombstone, not a value",
                locator.segment_id, locator.offset
            ))),
        }
    }

    fn maybe_rotate(&self, active: &mut ActiveSegment) -> StoreResult<()> {
        if active.size() >= self.config.max_segment_size {
            self.rotate(active)?;
        }
        Ok(())
    }

    /// Seals the active segment and starts a fresh one.
    ///
    /// The registry save is the commit: it records the seal and the new
    /// unsealed segment in one atomic write. If anything before it fails,
    /// the store keeps appending to the old segment and at worst an empty
    /// orphan file is left for reconciliation.
    fn rotate(&self, active: &mut ActiveSegment) -> StoreResult<()> {
        let old_id = active.id();
        let old_size = active.size();
        active.sync()?;

        let (new_active, path) = {
            let mut registry = self.registry.lock();
            let mut next = registry.clone();

            let id = next.allocate_id();
            let file_name = StoreDir::segment_file_name(id, 0);
            let path = self.dir.create_segment_file(&file_name)?;
            let new_active = ActiveSegment::open(id, path.clone(), self.config.flush_policy)?;

            next.mark_sealed(old_id);
            next.insert(SegmentMeta {
                id,
                generation: 0,
                file_name,
                created_at: u64::from(unix_timestamp()),
                sealed: false,
            });
            self.dir.save_registry(&next)?;
            *registry = next;
            (new_active, path)
        };

        let new_id = new_active.id();
        *active = new_active;
        self.descriptors.register(new_id, path);
        self.descriptors.pin_active(new_id);
        self.stats.record_rotation();

        info!(sealed = %old_id, bytes = old_size, active = %new_id, "rotated active segment");
        Ok(())
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::StoreClosed);
        }
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            if let Err(e) = self.close() {
                warn!(error = %e, "error while closing store on drop");
            }
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.dir.path())
            .field("keys", &self.keydir.read().len())
            .finish_non_exhaustive()
    }
}

/// Metadata and on-disk size for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Segment id.
    pub id: SegmentId,
    /// Rewrite generation, zero for segments that never compacted.
    pub generation: u32,
    /// File name inside the store directory.
    pub file_name: String,
    /// Whether the segment is sealed.
    pub sealed: bool,
    /// File size in bytes.
    pub size: u64,
}

/// Outcome of a full integrity scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Segments scanned.
    pub segments: usize,
    /// Records whose checksum verified, tombstones included.
    pub records: usize,
    /// Tombstones among those records.
    pub tombstones: usize,
    /// Bytes scanned.
    pub bytes: u64,
}

/// Lazy iterator over a key range. See [`Store::range_scan`].
pub struct RangeScan<'a> {
    store: &'a Store,
    keys: std::vec::IntoIter<Bytes>,
}

impl Iterator for RangeScan<'_> {
    type Item = StoreResult<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = self.keys.next()?;
            match self.store.lookup(&key) {
                Ok(Some((_, value))) => return Some(Ok((key, value))),
                // Deleted since the snapshot.
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl fmt::Debug for RangeScan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeScan")
            .field("remaining", &self.keys.len())
            .finish_non_exhaustive()
    }
}
