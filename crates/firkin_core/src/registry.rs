//! Durable registry of segment files.
//!
//! The registry is the commit point for every change to the segment set:
//! rotation registers the new active segment, compaction swaps its inputs
//! for its output, and recovery trusts only files the registry names.
//! Anything else in the store directory is a leftover to be reconciled
//! away.

use crate::error::{StoreError, StoreResult};
use crate::types::SegmentId;
use std::collections::BTreeMap;

/// Magic bytes for the registry file.
pub const REGISTRY_MAGIC: [u8; 4] = *b"FKRG";

/// Current registry format version.
pub const REGISTRY_VERSION: u16 = 1;

/// Metadata for one registered segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    /// Segment id; ascending id order is replay order.
    pub id: SegmentId,
    /// File generation. Bumped when compaction re-registers an id with a
    /// new backing file.
    pub generation: u32,
    /// File name within the store directory.
    pub file_name: String,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
    /// Whether the segment is sealed (immutable). At most the highest id
    /// is unsealed.
    pub sealed: bool,
}

/// In-memory registry state, persisted through [`crate::dir::StoreDir`].
#[derive(Debug, Clone)]
pub struct Registry {
    entries: BTreeMap<SegmentId, SegmentMeta>,
    next_id: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Allocates the next fresh segment id.
    ///
    /// Fresh ids are strictly above every id ever registered, so the active
    /// segment always sorts last in replay order.
    pub fn allocate_id(&mut self) -> SegmentId {
        let id = SegmentId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Registers or replaces an entry.
    pub fn insert(&mut self, meta: SegmentMeta) {
        if meta.id.as_u64() >= self.next_id {
            self.next_id = meta.id.as_u64() + 1;
        }
        self.entries.insert(meta.id, meta);
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, id: SegmentId) -> Option<&SegmentMeta> {
        self.entries.get(&id)
    }

    /// Removes an entry, returning it if present.
    pub fn remove(&mut self, id: SegmentId) -> Option<SegmentMeta> {
        self.entries.remove(&id)
    }

    /// Marks an entry sealed.
    pub fn mark_sealed(&mut self, id: SegmentId) {
        if let Some(meta) = self.entries.get_mut(&id) {
            meta.sealed = true;
        }
    }

    /// Entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &SegmentMeta> {
        self.entries.values()
    }

    /// Ids of sealed segments, ascending.
    #[must_use]
    pub fn sealed_ids(&self) -> Vec<SegmentId> {
        self.entries
            .values()
            .filter(|m| m.sealed)
            .map(|m| m.id)
            .collect()
    }

    /// The entry with the highest id.
    #[must_use]
    pub fn last(&self) -> Option<&SegmentMeta> {
        self.entries.values().next_back()
    }

    /// Number of registered segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no segments are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies a compaction commit: retires the input entries and, when the
    /// output holds any records, registers it in their place.
    pub fn apply_compaction(&mut self, retired: &[SegmentId], output: Option<SegmentMeta>) {
        for id in retired {
            self.entries.remove(id);
        }
        if let Some(meta) = output {
            self.insert(meta);
        }
    }

    /// Encodes the registry to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        // Magic
        buf.extend_from_slice(&REGISTRY_MAGIC);

        // Version
        buf.extend_from_slice(&REGISTRY_VERSION.to_le_bytes());

        // Next id
        buf.extend_from_slice(&self.next_id.to_le_bytes());

        // Entry count
        let count = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
        buf.extend_from_slice(&count.to_le_bytes());

        // Entries
        for meta in self.entries.values() {
            buf.extend_from_slice(&meta.id.as_u64().to_le_bytes());
            buf.extend_from_slice(&meta.generation.to_le_bytes());

            let name_bytes = meta.file_name.as_bytes();
            let name_len = u16::try_from(name_bytes.len()).unwrap_or(u16::MAX);
            buf.extend_from_slice(&name_len.to_le_bytes());
            buf.extend_from_slice(name_bytes);

            buf.extend_from_slice(&meta.created_at.to_le_bytes());
            buf.push(u8::from(meta.sealed));
        }

        buf
    }

    /// Decodes a registry from bytes.
    pub fn decode(data: &[u8]) -> StoreResult<Self> {
        let mut cursor = 0;

        // Magic
        if data.len() < 4 || data[0..4] != REGISTRY_MAGIC {
            return Err(StoreError::invalid_format("invalid registry magic"));
        }
        cursor += 4;

        // Version
        if cursor + 2 > data.len() {
            return Err(StoreError::invalid_format("registry too short"));
        }
        let version = u16::from_le_bytes([data[cursor], data[cursor + 1]]);
        cursor += 2;
        if version > REGISTRY_VERSION {
            return Err(StoreError::invalid_format(format!(
                "unsupported registry version: {version}"
            )));
        }

        // Next id
        if cursor + 8 > data.len() {
            return Err(StoreError::invalid_format("registry too short"));
        }
        let mut next_id = u64::from_le_bytes(
            data[cursor..cursor + 8]
                .try_into()
                .map_err(|_| StoreError::invalid_format("registry too short"))?,
        );
        cursor += 8;

        // Entry count
        if cursor + 4 > data.len() {
            return Err(StoreError::invalid_format("registry too short"));
        }
        let count = u32::from_le_bytes([
            data[cursor],
            data[cursor + 1],
            data[cursor + 2],
            data[cursor + 3],
        ]) as usize;
        cursor += 4;

        // Entries
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            if cursor + 14 > data.len() {
                return Err(StoreError::invalid_format("registry too short"));
            }
            let id = u64::from_le_bytes(
                data[cursor..cursor + 8]
                    .try_into()
                    .map_err(|_| StoreError::invalid_format("registry too short"))?,
            );
            cursor += 8;
            let generation = u32::from_le_bytes([
                data[cursor],
                data[cursor + 1],
                data[cursor + 2],
                data[cursor + 3],
            ]);
            cursor += 4;
            let name_len = u16::from_le_bytes([data[cursor], data[cursor + 1]]) as usize;
            cursor += 2;

            if cursor + name_len + 9 > data.len() {
                return Err(StoreError::invalid_format("registry too short"));
            }
            let file_name = std::str::from_utf8(&data[cursor..cursor + name_len])
                .map_err(|_| StoreError::invalid_format("invalid segment file name"))?
                .to_string();
            cursor += name_len;

            let created_at = u64::from_le_bytes(
                data[cursor..cursor + 8]
                    .try_into()
                    .map_err(|_| StoreError::invalid_format("registry too short"))?,
            );
            cursor += 8;
            let sealed = data[cursor] != 0;
            cursor += 1;

            if id >= next_id {
                next_id = id + 1;
            }
            entries.insert(
                SegmentId::new(id),
                SegmentMeta {
                    id: SegmentId::new(id),
                    generation,
                    file_name,
                    created_at,
                    sealed,
                },
            );
        }

        Ok(Self { entries, next_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: u64, sealed: bool) -> SegmentMeta {
        SegmentMeta {
            id: SegmentId::new(id),
            generation: 0,
            file_name: format!("seg-{id:06}-00.dat"),
            created_at: 1_700_000_000,
            sealed,
        }
    }

    #[test]
    fn allocate_is_monotonic() {
        let mut registry = Registry::new();
        let a = registry.allocate_id();
        let b = registry.allocate_id();
        assert_eq!(a, SegmentId::new(1));
        assert_eq!(b, SegmentId::new(2));
    }

    #[test]
    fn insert_bumps_next_id() {
        let mut registry = Registry::new();
        registry.insert(meta(5, true));
        assert_eq!(registry.allocate_id(), SegmentId::new(6));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut registry = Registry::new();
        registry.insert(meta(1, true));
        registry.insert(meta(2, true));
        registry.insert(meta(3, false));
        let reserved = registry.allocate_id();

        let mut decoded = Registry::decode(&registry.encode()).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(
            decoded.get(SegmentId::new(2)),
            registry.get(SegmentId::new(2))
        );
        assert_eq!(decoded.last().unwrap().id, SegmentId::new(3));
        // Allocation continues past both entries and prior reservations.
        assert!(decoded.allocate_id() > reserved);
    }

    #[test]
    fn decode_empty_registry() {
        let registry = Registry::new();
        let decoded = Registry::decode(&registry.encode()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn invalid_magic_rejected() {
        assert!(matches!(
            Registry::decode(b"XXXXxxxxxxxxxxxxxx"),
            Err(StoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn future_version_rejected() {
        let mut encoded = Registry::new().encode();
        encoded[4..6].copy_from_slice(&99u16.to_le_bytes());
        let err = Registry::decode(&encoded).unwrap_err();
        assert!(err.to_string().contains("unsupported registry version"));
    }

    #[test]
    fn truncated_registry_rejected() {
        let mut registry = Registry::new();
        registry.insert(meta(1, true));
        let encoded = registry.encode();
        assert!(Registry::decode(&encoded[..encoded.len() - 3]).is_err());
    }

    #[test]
    fn apply_compaction_swaps_entries() {
        let mut registry = Registry::new();
        registry.insert(meta(1, true));
        registry.insert(meta(2, true));
        registry.insert(meta(3, false));

        let output = SegmentMeta {
            id: SegmentId::new(2),
            generation: 1,
            file_name: "seg-000002-01.dat".to_string(),
            created_at: 1_700_000_001,
            sealed: true,
        };
        registry.apply_compaction(&[SegmentId::new(1), SegmentId::new(2)], Some(output));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(SegmentId::new(1)).is_none());
        assert_eq!(registry.get(SegmentId::new(2)).unwrap().generation, 1);
        assert_eq!(registry.sealed_ids(), vec![SegmentId::new(2)]);
    }

    #[test]
    fn mark_sealed() {
        let mut registry = Registry::new();
        registry.insert(meta(1, false));
        registry.mark_sealed(SegmentId::new(1));
        assert!(registry.get(SegmentId::new(1)).unwrap().sealed);
    }
}
