//! Shared read-handle cache for segment files.
//!
//! The table owns the authoritative `segment id -> file path` map for the
//! read path, plus a bounded cache of open [`SegmentHandle`]s with LRU
//! eviction. The active segment is pinned and never evicted. Compaction
//! swaps its inputs for its output under the table lock, so readers either
//! see the old mapping or the new one, never a mix.
//!
//! Eviction only drops the table's reference. Readers holding an
//! `Arc<SegmentHandle>` keep reading; the file closes when the last clone
//! goes away.

use crate::error::{StoreError, StoreResult};
use crate::segment::SegmentHandle;
use crate::types::SegmentId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Default)]
struct TableInner {
    /// Authoritative map of readable segments.
    paths: HashMap<SegmentId, PathBuf>,
    /// Cached open handles, a subset of `paths`.
    handles: HashMap<SegmentId, Arc<SegmentHandle>>,
    /// Cached ids, least recently used first.
    lru: Vec<SegmentId>,
    /// The active segment, exempt from eviction.
    pinned: Option<SegmentId>,
}

/// Bounded cache of open segment read handles.
#[derive(Debug)]
pub struct DescriptorTable {
    inner: Mutex<TableInner>,
    capacity: usize,
}

impl DescriptorTable {
    /// Creates an empty table that caches at most `capacity` open handles.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
            capacity,
        }
    }

    /// Makes `id` readable at `path`.
    pub fn register(&self, id: SegmentId, path: PathBuf) {
        let mut inner = self.inner.lock();
        inner.paths.insert(id, path);
    }

    /// Pins `id` as the active segment. The previous pin becomes evictable.
    pub fn pin_active(&self, id: SegmentId) {
        let mut inner = self.inner.lock();
        inner.pinned = Some(id);
    }

    /// Returns an open handle for `id`, opening and caching one if needed.
    ///
    /// Fails with [`StoreError::SegmentUnavailable`] when the id is not
    /// registered or its file has disappeared; callers retry once against a
    /// fresh index lookup, which sees the post-compaction location.
    pub fn acquire(&self, id: SegmentId) -> StoreResult<Arc<SegmentHandle>> {
        let mut inner = self.inner.lock();

        if let Some(handle) = inner.handles.get(&id).cloned() {
            touch(&mut inner.lru, id);
            return Ok(handle);
        }

        let Some(path) = inner.paths.get(&id).cloned() else {
            return Err(StoreError::SegmentUnavailable {
                segment_id: id.as_u64(),
            });
        };

        let handle = match SegmentHandle::open(id, &path) {
            Ok(handle) => Arc::new(handle),
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::SegmentUnavailable {
                    segment_id: id.as_u64(),
                });
            }
            Err(e) => return Err(e),
        };

        inner.handles.insert(id, Arc::clone(&handle));
        inner.lru.push(id);
        self.evict_over_capacity(&mut inner);

        Ok(handle)
    }

    /// Atomically retires `retired` ids and maps `output` to its new file.
    ///
    /// This is the compaction commit on the read path. The output id may
    /// coincide with a retired input id; the mapping then points at the
    /// output file, not the input it replaced.
    pub fn swap(&self, retired: &[SegmentId], output: Option<(SegmentId, PathBuf)>) {
        let mut inner = self.inner.lock();
        for id in retired {
            inner.paths.remove(id);
            inner.handles.remove(id);
            remove(&mut inner.lru, *id);
        }
        if let Some((id, path)) = output {
            inner.handles.remove(&id);
            remove(&mut inner.lru, id);
            inner.paths.insert(id, path);
        }
    }

    /// Drops every cached handle. Readers holding clones keep them until
    /// they finish; later acquires reopen on demand.
    pub fn release_handles(&self) {
        let mut inner = self.inner.lock();
        inner.handles.clear();
        inner.lru.clear();
    }

    /// Whether `id` is currently readable through the table.
    #[must_use]
    pub fn contains(&self, id: SegmentId) -> bool {
        self.inner.lock().paths.contains_key(&id)
    }

    /// Number of cached open handles.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.inner.lock().handles.len()
    }

    fn evict_over_capacity(&self, inner: &mut TableInner) {
        while inner.handles.len() > self.capacity {
            let Some(pos) = inner
                .lru
                .iter()
                .position(|id| Some(*id) != inner.pinned)
            else {
                return;
            };
            let id = inner.lru.remove(pos);
            inner.handles.remove(&id);
        }
    }
}

fn touch(lru: &mut Vec<SegmentId>, id: SegmentId) {
    remove(lru, id);
    lru.push(id);
}

fn remove(lru: &mut Vec<SegmentId>, id: SegmentId) {
    if let Some(pos) = lru.iter().position(|entry| *entry == id) {
        lru.remove(pos);
    }
}
