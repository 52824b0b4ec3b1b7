//! Segment files: the append path, positioned reads and streaming scans.
//!
//! A segment is an append-only file of encoded records. Exactly one segment
//! is active (writable) at a time; rotation seals it and starts the next.
//! Sealed segments are immutable until compaction deletes them.
//!
//! ## Scan recovery policy
//!
//! [`SegmentScanner`] streams `(offset, record)` pairs with a bounded read
//! buffer and distinguishes two kinds of damage:
//!
//! - **Truncated record** (file ends before the declared length): surfaced
//!   as [`StoreError::TruncatedRecord`]. Recovery tolerates this at the
//!   tail of the unsealed segment by truncating the file back to the last
//!   good offset.
//! - **Corrupt record** (impossible sizes, checksum mismatch): surfaced as
//!   the decode error. Never tolerated in a sealed segment.
//!
//! A clean end of file simply ends iteration.

use crate::config::FlushPolicy;
use crate::error::{StoreError, StoreResult};
use crate::record::{Record, RecordHeader, RECORD_HEADER_SIZE};
use crate::types::SegmentId;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Read buffer size for streaming scans. Grows only for oversized records.
const SCAN_BUFFER_SIZE: usize = 64 * 1024; // 64 KB

/// The writable end of the newest segment.
///
/// Appends go through a single writer path in the store, so this takes
/// `&mut self` and performs no locking of its own.
#[derive(Debug)]
pub struct ActiveSegment {
    id: SegmentId,
    path: PathBuf,
    file: File,
    size: u64,
    flush_policy: FlushPolicy,
}

impl ActiveSegment {
    /// Opens a segment file for appending, creating it if absent.
    ///
    /// Appends continue at the current end of file, so reopening the
    /// unsealed segment after recovery resumes exactly where the last good
    /// record ended.
    pub fn open(id: SegmentId, path: PathBuf, flush_policy: FlushPolicy) -> StoreResult<Self> {
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            id,
            path,
            file,
            size,
            flush_policy,
        })
    }

    /// Appends encoded record bytes, returning the record's start offset.
    ///
    /// The bytes reach the OS before this returns, so read handles opened
    /// on the same path observe them immediately. Durability depends on the
    /// flush policy.
    pub fn append(&mut self, bytes: &[u8]) -> StoreResult<u64> {
        let offset = self.size;
        self.file.write_all(bytes)?;
        self.size += bytes.len() as u64;

        if self.flush_policy == FlushPolicy::EveryWrite {
            self.file.sync_all()?;
        }

        Ok(offset)
    }

    /// Forces everything written so far to stable storage.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Seals the segment: all completed appends are durable once this
    /// returns. The file is immutable afterwards.
    pub fn seal(mut self) -> StoreResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Segment id.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Current size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Truncates a segment file to `len` bytes and syncs it.
///
/// Used by recovery to drop a damaged tail before the segment is reopened
/// for appending.
pub(crate) fn truncate_segment(path: &Path, len: u64) -> StoreResult<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_all()?;
    Ok(())
}

/// A shared read handle for one segment file.
///
/// Cloneable through `Arc`; reads are positioned, so concurrent readers
/// never contend on a file cursor (on unix; other platforms serialize the
/// seek-and-read pair internally).
#[derive(Debug)]
pub struct SegmentHandle {
    id: SegmentId,
    file: File,
    #[cfg(not(unix))]
    cursor: parking_lot::Mutex<()>,
}

impl SegmentHandle {
    /// Opens a segment file read-only.
    pub fn open(id: SegmentId, path: &Path) -> StoreResult<Self> {
        let file = File::open(path)?;
        Ok(Self {
            id,
            file,
            #[cfg(not(unix))]
            cursor: parking_lot::Mutex::new(()),
        })
    }

    /// Segment id this handle reads from.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Reads exactly `len` bytes starting at `offset`.
    #[cfg(unix)]
    pub fn read_exact_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        use std::os::unix::fs::FileExt;
        let mut buf = vec![0u8; len];
        self.file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }

    /// Reads exactly `len` bytes starting at `offset`.
    #[cfg(not(unix))]
    pub fn read_exact_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let _guard = self.cursor.lock();
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// A streaming iterator over the records of one segment file.
///
/// Reads in buffered chunks, keeping memory bounded regardless of segment
/// size. Used by recovery, verification and nothing else; point reads go
/// through [`SegmentHandle`].
pub struct SegmentScanner {
    file: File,
    /// Total file size at open.
    total_size: u64,
    /// File offset of the next unparsed byte.
    current_offset: u64,
    buffer: Vec<u8>,
    buffer_pos: usize,
    buffer_len: usize,
    finished: bool,
}

impl SegmentScanner {
    /// Opens a scanner over a segment file, starting at offset zero.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = File::open(path)?;
        let total_size = file.metadata()?.len();
        Ok(Self {
            file,
            total_size,
            current_offset: 0,
            buffer: vec![0u8; SCAN_BUFFER_SIZE],
            buffer_pos: 0,
            buffer_len: 0,
            finished: false,
        })
    }

    /// File offset of the next unparsed byte.
    ///
    /// After an error this is the start of the record that failed, which is
    /// exactly where recovery truncates.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.current_offset
    }

    /// Total size of the file being scanned.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Ensures at least `min_bytes` are buffered from the current position.
    ///
    /// Returns `false` when the file does not hold that many bytes past the
    /// current offset. The buffer grows for records larger than the default
    /// chunk.
    fn ensure_buffered(&mut self, min_bytes: usize) -> StoreResult<bool> {
        let available = self.buffer_len - self.buffer_pos;
        if available >= min_bytes {
            return Ok(true);
        }

        let unread = (self.total_size - self.current_offset) as usize - available;
        if available + unread < min_bytes {
            return Ok(false);
        }

        // Move the unparsed remainder to the front.
        if self.buffer_pos > 0 {
            self.buffer.copy_within(self.buffer_pos..self.buffer_len, 0);
            self.buffer_len = available;
            self.buffer_pos = 0;
        }

        if min_bytes > self.buffer.len() {
            self.buffer.resize(min_bytes.next_power_of_two(), 0);
        }

        let want = std::cmp::min(self.buffer.len() - self.buffer_len, unread);
        let read_offset = self.current_offset + self.buffer_len as u64;
        self.file.seek(SeekFrom::Start(read_offset))?;
        self.file
            .read_exact(&mut self.buffer[self.buffer_len..self.buffer_len + want])?;
        self.buffer_len += want;

        Ok(self.buffer_len - self.buffer_pos >= min_bytes)
    }

    /// Reads the next record.
    ///
    /// `Ok(Some((offset, record)))` for a valid record, `Ok(None)` at the
    /// clean end of file, `Err` on a truncated or damaged record. Any error
    /// finishes the scanner.
    pub fn next_record(&mut self) -> StoreResult<Option<(u64, Record)>> {
        if self.finished {
            return Ok(None);
        }

        let record_start = self.current_offset;
        let remaining = (self.total_size - record_start) as usize;

        if !self.ensure_buffered(RECORD_HEADER_SIZE)? {
            self.finished = true;
            if remaining == 0 {
                return Ok(None);
            }
            return Err(StoreError::truncated_record(RECORD_HEADER_SIZE, remaining));
        }

        let header = match RecordHeader::decode(&self.buffer[self.buffer_pos..self.buffer_len]) {
            Ok(header) => header,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };

        let total_len = header.encoded_len();
        if !self.ensure_buffered(total_len)? {
            self.finished = true;
            return Err(StoreError::truncated_record(total_len, remaining));
        }

        let record = match Record::decode(&self.buffer[self.buffer_pos..self.buffer_pos + total_len])
        {
            Ok(record) => record,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };

        self.buffer_pos += total_len;
        self.current_offset += total_len as u64;

        Ok(Some((record_start, record)))
    }
}

impl Iterator for SegmentScanner {
    type Item = StoreResult<(u64, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    fn record(key: &str, value: &str) -> Record {
        Record::put(
            Bytes::copy_from_slice(key.as_bytes()),
            Bytes::copy_from_slice(value.as_bytes()),
            1_700_000_000,
        )
    }

    fn write_records(path: &Path, records: &[Record]) -> Vec<u64> {
        let mut segment =
            ActiveSegment::open(SegmentId::new(1), path.to_path_buf(), FlushPolicy::EveryWrite)
                .unwrap();
        records
            .iter()
            .map(|r| segment.append(&r.encode().unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn append_tracks_offsets_and_size() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("seg-000001-00.dat");

        let a = record("a", "1");
        let b = record("bb", "22");
        let offsets = write_records(&path, &[a.clone(), b.clone()]);

        assert_eq!(offsets[0], 0);
        assert_eq!(offsets[1], a.encoded_len() as u64);

        let segment =
            ActiveSegment::open(SegmentId::new(1), path.clone(), FlushPolicy::EveryWrite).unwrap();
        assert_eq!(segment.size(), (a.encoded_len() + b.encoded_len()) as u64);
    }

    #[test]
    fn reopen_appends_at_tail() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("seg-000001-00.dat");

        let a = record("a", "1");
        write_records(&path, &[a.clone()]);

        let mut segment =
            ActiveSegment::open(SegmentId::new(1), path.clone(), FlushPolicy::EveryWrite).unwrap();
        let offset = segment.append(&record("b", "2").encode().unwrap()).unwrap();
        assert_eq!(offset, a.encoded_len() as u64);
    }

    #[test]
    fn scanner_yields_all_records_in_order() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("seg.dat");

        let records = vec![record("a", "1"), record("b", "2"), record("c", "3")];
        let offsets = write_records(&path, &records);

        let scanner = SegmentScanner::open(&path).unwrap();
        let scanned: Vec<(u64, Record)> = scanner.map(|r| r.unwrap()).collect();

        assert_eq!(scanned.len(), 3);
        for (i, (offset, rec)) in scanned.iter().enumerate() {
            assert_eq!(*offset, offsets[i]);
            assert_eq!(rec, &records[i]);
        }
    }

    #[test]
    fn scanner_handles_empty_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("seg.dat");
        File::create(&path).unwrap();

        let mut scanner = SegmentScanner::open(&path).unwrap();
        assert!(scanner.next_record().unwrap().is_none());
    }

    #[test]
    fn scanner_reports_torn_tail_with_offset() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("seg.dat");

        let good = record("good", "value");
        write_records(&path, &[good.clone()]);

        // Simulate a crash mid-append: half a record at the tail.
        let partial = record("torn", "lost").encode().unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&partial[..partial.len() / 2]).unwrap();
        file.sync_all().unwrap();

        let mut scanner = SegmentScanner::open(&path).unwrap();
        let (offset, rec) = scanner.next_record().unwrap().unwrap();
        assert_eq!(offset, 0);
        assert_eq!(rec, good);

        let err = scanner.next_record().unwrap_err();
        assert!(err.is_truncation());
        // The scanner is parked at the start of the damaged record.
        assert_eq!(scanner.offset(), good.encoded_len() as u64);
    }

    #[test]
    fn scanner_reports_checksum_damage() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("seg.dat");

        let a = record("a", "1");
        let b = record("b", "2");
        write_records(&path, &[a.clone(), b]);

        // Flip one byte inside the second record's payload.
        let mut data = std::fs::read(&path).unwrap();
        let hit = a.encoded_len() + RECORD_HEADER_SIZE;
        data[hit] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        let mut scanner = SegmentScanner::open(&path).unwrap();
        assert!(scanner.next_record().unwrap().is_some());
        let err = scanner.next_record().unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
        assert_eq!(scanner.offset(), a.encoded_len() as u64);

        // Errors finish the scanner.
        assert!(scanner.next_record().unwrap().is_none());
    }

    #[test]
    fn scanner_grows_buffer_for_large_records() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("seg.dat");

        let big_value = "x".repeat(3 * SCAN_BUFFER_SIZE);
        let records = vec![record("before", "1"), record("big", &big_value), record("after", "2")];
        write_records(&path, &records);

        let scanner = SegmentScanner::open(&path).unwrap();
        let scanned: Vec<Record> = scanner.map(|r| r.unwrap().1).collect();
        assert_eq!(scanned, records);
    }

    #[test]
    fn handle_reads_at_offsets() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("seg.dat");

        let a = record("alpha", "first");
        let b = record("beta", "second");
        let offsets = write_records(&path, &[a.clone(), b.clone()]);

        let handle = SegmentHandle::open(SegmentId::new(1), &path).unwrap();

        let bytes = handle.read_exact_at(offsets[1], b.encoded_len()).unwrap();
        assert_eq!(Record::decode(&bytes).unwrap(), b);

        let bytes = handle.read_exact_at(offsets[0], a.encoded_len()).unwrap();
        assert_eq!(Record::decode(&bytes).unwrap(), a);
    }

    #[test]
    fn handle_read_past_end_is_io_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("seg.dat");
        write_records(&path, &[record("a", "1")]);

        let handle = SegmentHandle::open(SegmentId::new(1), &path).unwrap();
        assert!(matches!(
            handle.read_exact_at(10_000, 32),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn truncate_drops_tail() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("seg.dat");

        let a = record("keep", "me");
        write_records(&path, &[a.clone(), record("drop", "me")]);

        truncate_segment(&path, a.encoded_len() as u64).unwrap();

        let scanner = SegmentScanner::open(&path).unwrap();
        let scanned: Vec<Record> = scanner.map(|r| r.unwrap().1).collect();
        assert_eq!(scanned, vec![a]);
    }
}
