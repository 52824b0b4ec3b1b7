//! Merging sealed segments into one and dropping the garbage.
//!
//! Compaction copies every record the index still points at out of the
//! sealed segments into a single new segment, then retires the inputs.
//! Overwritten values and tombstones are simply not copied; the index never
//! holds either, so the survivor snapshot is exactly the live set.
//!
//! ## Output placement
//!
//! The output segment keeps the **highest input id** with a bumped
//! generation for its file name. Fresh active segments always allocate
//! above every id the registry has ever handed out, so replay in ascending
//! id order still visits the merged records before anything written while
//! compaction ran. A crash at any point leaves either the inputs (output
//! not yet registered, its file reconciled away at open) or the output
//! (inputs retired) authoritative, never a mix.
//!
//! ## Commit points
//!
//! 1. Read path: index repoints and descriptor swap, one critical section.
//! 2. Durability: registry save.
//! 3. Cleanup: input files deleted. Crashing before this only leaves
//!    orphans for reconciliation.

use crate::config::FlushPolicy;
use crate::descriptor::DescriptorTable;
use crate::dir::StoreDir;
use crate::error::{StoreError, StoreResult};
use crate::keydir::{KeyDir, Locator};
use crate::record::Record;
use crate::registry::{Registry, SegmentMeta};
use crate::segment::ActiveSegment;
use crate::stats::StoreStats;
use crate::types::{unix_timestamp, SegmentId};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// What one compaction run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Sealed segments merged and retired.
    pub segments_in: usize,
    /// Live records copied into the output.
    pub records_copied: usize,
    /// Total size of the input segment files.
    pub bytes_in: u64,
    /// Size of the output segment file, zero when nothing survived.
    pub bytes_out: u64,
}

impl CompactionStats {
    /// Disk space released by the run.
    #[must_use]
    pub fn bytes_reclaimed(&self) -> u64 {
        self.bytes_in.saturating_sub(self.bytes_out)
    }
}

/// One compaction run over a store's sealed segments.
///
/// Borrows the store's shared state; the caller serializes runs, so at most
/// one compactor exists at a time.
pub(crate) struct Compactor<'a> {
    pub(crate) dir: &'a StoreDir,
    pub(crate) keydir: &'a RwLock<KeyDir>,
    pub(crate) registry: &'a Mutex<Registry>,
    pub(crate) descriptors: &'a DescriptorTable,
    pub(crate) stats: &'a StoreStats,
}

impl Compactor<'_> {
    /// Merges all currently sealed segments.
    ///
    /// Writes made while this runs land in the active segment and are
    /// untouched; an entry repointed here is only repointed if its locator
    /// is still the one snapshotted, so concurrent overwrites and deletes
    /// win.
    pub(crate) fn run(&self) -> StoreResult<CompactionStats> {
        let inputs: Vec<SegmentMeta> = {
            let registry = self.registry.lock();
            registry.iter().filter(|meta| meta.sealed).cloned().collect()
        };

        let Some(newest) = inputs.last() else {
            debug!("no sealed segments, nothing to compact");
            return Ok(CompactionStats::default());
        };

        let output_id = newest.id;
        let generation = newest.generation + 1;
        let file_name = StoreDir::segment_file_name(output_id, generation);

        let input_ids: Vec<SegmentId> = inputs.iter().map(|meta| meta.id).collect();
        let input_set: HashSet<SegmentId> = input_ids.iter().copied().collect();

        let mut run_stats = CompactionStats {
            segments_in: inputs.len(),
            ..CompactionStats::default()
        };
        for meta in &inputs {
            run_stats.bytes_in += std::fs::metadata(self.dir.segment_path(&meta.file_name))?.len();
        }

        let survivors = self.keydir.read().entries_in_segments(&input_set);

        let output = if survivors.is_empty() {
            None
        } else {
            let (path, moves) = self.write_output(output_id, &file_name, &survivors)?;
            run_stats.records_copied = moves.len();
            run_stats.bytes_out = std::fs::metadata(&path)?.len();
            Some((path, moves))
        };

        // Read-path commit. Repoints and the descriptor swap share one
        // critical section so no reader observes a retired id with a stale
        // index entry still pointing at it for longer than one retry.
        {
            let mut keydir = self.keydir.write();
            match &output {
                Some((path, moves)) => {
                    for (key, old, new) in moves {
                        if keydir.get(key) == Some(*old) {
                            keydir.put(key.clone(), *new);
                        }
                    }
                    self.descriptors.swap(&input_ids, Some((output_id, path.clone())));
                }
                None => self.descriptors.swap(&input_ids, None),
            }
        }

        // Durability commit.
        let output_meta = output.as_ref().map(|_| SegmentMeta {
            id: output_id,
            generation,
            file_name: file_name.clone(),
            created_at: u64::from(unix_timestamp()),
            sealed: true,
        });
        {
            let mut registry = self.registry.lock();
            registry.apply_compaction(&input_ids, output_meta);
            self.dir.save_registry(&registry)?;
        }

        let input_names: Vec<&str> = inputs.iter().map(|meta| meta.file_name.as_str()).collect();
        let deleted = self.dir.delete_segment_files(&input_names)?;
        debug!(deleted, "removed retired segment files");

        self.stats.record_compaction();
        info!(
            segments_in = run_stats.segments_in,
            records = run_stats.records_copied,
            reclaimed = run_stats.bytes_reclaimed(),
            output = %file_name,
            "compaction complete"
        );

        Ok(run_stats)
    }

    /// Copies the survivors into a fresh output file, in key order.
    ///
    /// Record bytes move verbatim so timestamps and checksums carry over;
    /// each record is decoded first, which re-verifies its checksum before
    /// it can propagate.
    fn write_output(
        &self,
        output_id: SegmentId,
        file_name: &str,
        survivors: &[(Bytes, Locator)],
    ) -> StoreResult<(PathBuf, Vec<(Bytes, Locator, Locator)>)> {
        let path = self.dir.create_segment_file(file_name)?;
        let mut writer = ActiveSegment::open(output_id, path.clone(), FlushPolicy::OnRotation)?;

        let mut moves = Vec::with_capacity(survivors.len());
        for (key, old) in survivors {
            let handle = self.descriptors.acquire(old.segment_id)?;
            let bytes = handle.read_exact_at(old.offset, old.length as usize)?;

            let record = Record::decode(&bytes)?;
            if record.key != *key {
                return Err(StoreError::corrupt_record(format!(
                    "segment {} offset {} holds a different key than indexed",
                    old.segment_id, old.offset
                )));
            }

            let offset = writer.append(&bytes)?;
            moves.push((
                key.clone(),
                *old,
                Locator {
                    segment_id: output_id,
                    offset,
                    length: old.length,
                    timestamp: old.timestamp,
                },
            ));
        }

        writer.seal()?;
        Ok((path, moves))
    }
}
