//! On-disk record codec.
//!
//! Every write becomes one record appended to the active segment:
//!
//! ```text
//! | crc32 (4) | timestamp (4) | key_size (4) | value_size (4) | key (K) | value (V) |
//! ```
//!
//! All integers are big-endian; the layout is a portability contract, pinned
//! by golden byte tests below. The CRC covers everything after itself. A
//! tombstone is marked by the `value_size` sentinel `0xFFFF_FFFF` and carries
//! no value bytes, which keeps it distinct from a legal empty value
//! (`value_size == 0`).
//!
//! Decoding distinguishes a record that was cut short (fewer bytes available
//! than the header declares) from one that is damaged (impossible sizes,
//! checksum failure). Recovery relies on the split: truncation at the tail of
//! the unsealed segment is survivable, corruption is not.

use crate::error::{StoreError, StoreResult};
use bytes::Bytes;

/// Fixed number of bytes before the key: crc + timestamp + key_size + value_size.
pub const RECORD_HEADER_SIZE: usize = 16;

/// `value_size` sentinel marking a tombstone.
pub const TOMBSTONE_SENTINEL: u32 = u32::MAX;

/// Largest encodable key. A decoded header claiming more is corrupt.
pub const MAX_KEY_SIZE: usize = 1 << 20; // 1 MiB

/// Largest encodable value. A decoded header claiming more is corrupt.
pub const MAX_VALUE_SIZE: usize = 1 << 28; // 256 MiB

/// The fixed-size prefix of an encoded record.
///
/// Streaming scans decode the header first to learn the record's extent
/// before the payload is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Stored checksum over the rest of the record.
    pub crc: u32,
    /// Seconds since the Unix epoch when the record was written.
    pub timestamp: u32,
    /// Key length in bytes.
    pub key_size: u32,
    /// Value length in bytes, or [`TOMBSTONE_SENTINEL`].
    pub value_size: u32,
}

impl RecordHeader {
    /// Decodes the fixed prefix, validating the declared sizes.
    ///
    /// Returns [`StoreError::TruncatedRecord`] when fewer than
    /// [`RECORD_HEADER_SIZE`] bytes are available and
    /// [`StoreError::CorruptRecord`] when a declared size is impossible.
    pub fn decode(data: &[u8]) -> StoreResult<Self> {
        if data.len() < RECORD_HEADER_SIZE {
            return Err(StoreError::truncated_record(RECORD_HEADER_SIZE, data.len()));
        }

        let crc = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let key_size = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let value_size = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);

        if key_size as usize > MAX_KEY_SIZE {
            return Err(StoreError::corrupt_record(format!(
                "declared key size {key_size} exceeds maximum {MAX_KEY_SIZE}"
            )));
        }
        if value_size != TOMBSTONE_SENTINEL && value_size as usize > MAX_VALUE_SIZE {
            return Err(StoreError::corrupt_record(format!(
                "declared value size {value_size} exceeds maximum {MAX_VALUE_SIZE}"
            )));
        }

        Ok(Self {
            crc,
            timestamp,
            key_size,
            value_size,
        })
    }

    /// Whether the header marks a tombstone.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.value_size == TOMBSTONE_SENTINEL
    }

    /// Value bytes present on disk (zero for a tombstone).
    #[must_use]
    pub const fn value_len(&self) -> usize {
        if self.is_tombstone() {
            0
        } else {
            self.value_size as usize
        }
    }

    /// Total encoded record length, header included.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.key_size as usize + self.value_len()
    }
}

/// A decoded record: one durable write or deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Seconds since the Unix epoch when the record was written. Metadata
    /// only; replay order never consults it.
    pub timestamp: u32,
    /// The key.
    pub key: Bytes,
    /// The value, or `None` for a tombstone. `Some` of an empty buffer is a
    /// legal value distinct from a tombstone.
    pub value: Option<Bytes>,
}

impl Record {
    /// Creates a value record.
    #[must_use]
    pub fn put(key: Bytes, value: Bytes, timestamp: u32) -> Self {
        Self {
            timestamp,
            key,
            value: Some(value),
        }
    }

    /// Creates a tombstone record.
    #[must_use]
    pub fn tombstone(key: Bytes, timestamp: u32) -> Self {
        Self {
            timestamp,
            key,
            value: None,
        }
    }

    /// Returns whether this is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.key.len() + self.value.as_ref().map_or(0, |v| v.len())
    }

    /// Encodes the record to bytes.
    ///
    /// Fails with [`StoreError::KeyTooLarge`] or [`StoreError::ValueTooLarge`]
    /// when a size cannot be represented; nothing is written in that case.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        if self.key.len() > MAX_KEY_SIZE {
            return Err(StoreError::KeyTooLarge {
                size: self.key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        let value_size = match &self.value {
            Some(v) => {
                if v.len() > MAX_VALUE_SIZE {
                    return Err(StoreError::ValueTooLarge {
                        size: v.len(),
                        max: MAX_VALUE_SIZE,
                    });
                }
                v.len() as u32
            }
            None => TOMBSTONE_SENTINEL,
        };

        let mut buf = Vec::with_capacity(self.encoded_len());

        // Checksum is prepended last; reserve its slot.
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&(self.key.len() as u32).to_be_bytes());
        buf.extend_from_slice(&value_size.to_be_bytes());
        buf.extend_from_slice(&self.key);
        if let Some(value) = &self.value {
            buf.extend_from_slice(value);
        }

        let crc = crc32fast::hash(&buf[4..]);
        buf[..4].copy_from_slice(&crc.to_be_bytes());

        Ok(buf)
    }

    /// Decodes one record from the front of `data`.
    ///
    /// `data` may extend past the record; the header determines the extent.
    /// Returns [`StoreError::TruncatedRecord`] when the buffer ends before
    /// the declared length, [`StoreError::ChecksumMismatch`] when the stored
    /// CRC disagrees with the payload.
    pub fn decode(data: &[u8]) -> StoreResult<Self> {
        let header = RecordHeader::decode(data)?;
        let total = header.encoded_len();

        if data.len() < total {
            return Err(StoreError::truncated_record(total, data.len()));
        }

        let computed = crc32fast::hash(&data[4..total]);
        if computed != header.crc {
            return Err(StoreError::ChecksumMismatch {
                expected: header.crc,
                actual: computed,
            });
        }

        let key_end = RECORD_HEADER_SIZE + header.key_size as usize;
        let key = Bytes::copy_from_slice(&data[RECORD_HEADER_SIZE..key_end]);
        let value = if header.is_tombstone() {
            None
        } else {
            Some(Bytes::copy_from_slice(&data[key_end..total]))
        };

        Ok(Self {
            timestamp: header.timestamp,
            key,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &[u8], value: &[u8]) -> Record {
        Record::put(
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
            1_700_000_000,
        )
    }

    #[test]
    fn put_record_roundtrip() {
        let record = put(b"hello", b"world");
        let encoded = record.encode().unwrap();
        let decoded = Record::decode(&encoded).unwrap();

        assert_eq!(record, decoded);
        assert_eq!(encoded.len(), record.encoded_len());
    }

    #[test]
    fn tombstone_roundtrip() {
        let record = Record::tombstone(Bytes::from_static(b"gone"), 99);
        assert!(record.is_tombstone());

        let encoded = record.encode().unwrap();
        let decoded = Record::decode(&encoded).unwrap();

        assert_eq!(record, decoded);
        assert!(decoded.is_tombstone());
    }

    #[test]
    fn empty_value_is_not_a_tombstone() {
        let record = put(b"k", b"");
        let encoded = record.encode().unwrap();
        let decoded = Record::decode(&encoded).unwrap();

        assert!(!decoded.is_tombstone());
        assert_eq!(decoded.value, Some(Bytes::new()));
    }

    #[test]
    fn empty_key_roundtrip() {
        let record = put(b"", b"value");
        let decoded = Record::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded.key, Bytes::new());
        assert_eq!(decoded.value.as_deref(), Some(b"value".as_slice()));
    }

    #[test]
    fn detect_corruption() {
        let mut encoded = put(b"abc", b"def").encode().unwrap();
        encoded[18] ^= 0xFF; // flip a key byte

        let result = Record::decode(&encoded);
        assert!(matches!(result, Err(StoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn detect_truncation() {
        let encoded = put(b"abc", b"defghi").encode().unwrap();

        let short = &encoded[..encoded.len() - 2];
        assert!(matches!(
            Record::decode(short),
            Err(StoreError::TruncatedRecord { .. })
        ));

        let header_only = &encoded[..7];
        assert!(matches!(
            Record::decode(header_only),
            Err(StoreError::TruncatedRecord { .. })
        ));
    }

    #[test]
    fn insane_declared_size_is_corruption_not_truncation() {
        let mut encoded = put(b"abc", b"def").encode().unwrap();
        // Declare a 2 GiB value.
        encoded[12..16].copy_from_slice(&0x8000_0000u32.to_be_bytes());

        assert!(matches!(
            Record::decode(&encoded),
            Err(StoreError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn oversized_key_rejected_at_encode() {
        let record = Record::put(
            Bytes::from(vec![0u8; MAX_KEY_SIZE + 1]),
            Bytes::new(),
            0,
        );
        assert!(matches!(
            record.encode(),
            Err(StoreError::KeyTooLarge { .. })
        ));
    }

    #[test]
    fn golden_put_bytes() {
        // Pinned layout: big-endian crc | timestamp | key_size | value_size,
        // then key then value. Changing any of this breaks on-disk
        // compatibility.
        let encoded = put(b"hello", b"world").encode().unwrap();
        let expected: &[u8] = &[
            0xFC, 0x8F, 0x50, 0x9A, // crc32
            0x65, 0x53, 0xF1, 0x00, // timestamp 1_700_000_000
            0x00, 0x00, 0x00, 0x05, // key_size
            0x00, 0x00, 0x00, 0x05, // value_size
            0x68, 0x65, 0x6C, 0x6C, 0x6F, // "hello"
            0x77, 0x6F, 0x72, 0x6C, 0x64, // "world"
        ];
        assert_eq!(encoded, expected);
    }

    #[test]
    fn golden_tombstone_bytes() {
        let record = Record::tombstone(Bytes::from_static(b"hello"), 1_700_000_000);
        let encoded = record.encode().unwrap();
        let expected: &[u8] = &[
            0x51, 0xF8, 0xB6, 0xD8, // crc32
            0x65, 0x53, 0xF1, 0x00, // timestamp
            0x00, 0x00, 0x00, 0x05, // key_size
            0xFF, 0xFF, 0xFF, 0xFF, // tombstone sentinel
            0x68, 0x65, 0x6C, 0x6C, 0x6F, // "hello"
        ];
        assert_eq!(encoded, expected);
    }

    #[test]
    fn header_reports_extent() {
        let encoded = put(b"key", b"value").encode().unwrap();
        let header = RecordHeader::decode(&encoded).unwrap();
        assert_eq!(header.encoded_len(), encoded.len());
        assert!(!header.is_tombstone());

        let tomb = Record::tombstone(Bytes::from_static(b"key"), 0)
            .encode()
            .unwrap();
        let header = RecordHeader::decode(&tomb).unwrap();
        assert!(header.is_tombstone());
        assert_eq!(header.value_len(), 0);
        assert_eq!(header.encoded_len(), RECORD_HEADER_SIZE + 3);
    }
}
