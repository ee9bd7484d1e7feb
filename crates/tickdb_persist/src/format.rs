//! # Snapshot File Format
//!
//! One file per record type, holding every object that was live at the
//! moment of the flush.
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "TKDB"]
//! [4 bytes: record size]
//! [4 bytes: live count]
//! [4 bytes: slot count]
//!
//! Live entry (live count times):
//! [8 bytes: object id]
//! [N bytes: record, N = record size]
//!
//! Free entry (slot count - live count times):
//! [4 bytes: slot index]
//! [4 bytes: slot generation]
//!
//! [4 bytes: CRC32 of everything above]
//! ```
//!
//! All integers are little endian. Free entries carry generations so that
//! identifiers held by persisted records are not handed out again after a
//! restart.

use crate::error::{PersistError, PersistResult};
use std::path::Path;

/// Magic bytes identifying a snapshot file.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"TKDB";

const HEADER_LEN: usize = 16;
const CRC_LEN: usize = 4;
const FREE_ENTRY_LEN: usize = 8;

/// A live record as stored on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveRecord {
    /// Raw object identifier.
    pub id: u64,
    /// Record bytes, exactly `record_size` long.
    pub bytes: Vec<u8>,
}

/// A free slot as stored on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeSlot {
    /// Slot index inside the store.
    pub index: u32,
    /// Generation the next occupant of this slot will receive.
    pub generation: u32,
}

/// Complete on-disk image of one type's store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeImage {
    /// Size of one record in bytes.
    pub record_size: u32,
    /// Total slots (live + free) the store had.
    pub slot_count: u32,
    /// Live records in slot order.
    pub live: Vec<LiveRecord>,
    /// Free slots in slot order.
    pub free: Vec<FreeSlot>,
}

impl TypeImage {
    /// Creates an empty image for records of `record_size` bytes.
    #[must_use]
    pub fn new(record_size: u32) -> Self {
        Self {
            record_size,
            ..Self::default()
        }
    }

    /// Number of bytes [`encode`](Self::encode) will produce.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + self.live.len() * (8 + self.record_size as usize)
            + self.free.len() * FREE_ENTRY_LEN
            + CRC_LEN
    }

    /// Serializes the image.
    ///
    /// # Panics
    ///
    /// Panics if a live record's length differs from `record_size`, or if the
    /// live and free counts do not add up to `slot_count`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        assert_eq!(
            self.live.len() + self.free.len(),
            self.slot_count as usize,
            "Snapshot image slot accounting is inconsistent"
        );

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(SNAPSHOT_MAGIC);
        buf.extend_from_slice(&self.record_size.to_le_bytes());
        buf.extend_from_slice(&(self.live.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.slot_count.to_le_bytes());

        for record in &self.live {
            assert_eq!(
                record.bytes.len(),
                self.record_size as usize,
                "Record byte length does not match declared record size"
            );
            buf.extend_from_slice(&record.id.to_le_bytes());
            buf.extend_from_slice(&record.bytes);
        }

        for slot in &self.free {
            buf.extend_from_slice(&slot.index.to_le_bytes());
            buf.extend_from_slice(&slot.generation.to_le_bytes());
        }

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parses an image, validating magic, record size and checksum.
    ///
    /// `path` is only used for error context.
    pub fn decode(data: &[u8], expected_record_size: u32, path: &Path) -> PersistResult<Self> {
        if data.len() < HEADER_LEN + CRC_LEN {
            return Err(PersistError::Truncated {
                path: path.to_path_buf(),
                needed: HEADER_LEN + CRC_LEN - data.len(),
            });
        }

        let (body, crc_bytes) = data.split_at(data.len() - CRC_LEN);
        let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(body) != stored_crc {
            return Err(PersistError::Corrupt {
                path: path.to_path_buf(),
                reason: "checksum mismatch".to_string(),
            });
        }

        let mut reader = Reader { data: body, pos: 0, path };

        if reader.take(4)? != SNAPSHOT_MAGIC {
            return Err(PersistError::Corrupt {
                path: path.to_path_buf(),
                reason: "invalid magic".to_string(),
            });
        }

        let record_size = reader.u32()?;
        if record_size != expected_record_size {
            return Err(PersistError::RecordSizeMismatch {
                path: path.to_path_buf(),
                found: record_size,
                expected: expected_record_size,
            });
        }

        let live_count = reader.u32()?;
        let slot_count = reader.u32()?;
        if live_count > slot_count {
            return Err(PersistError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("live count {live_count} exceeds slot count {slot_count}"),
            });
        }

        let free_count = slot_count - live_count;
        let entries_len = u64::from(live_count)
            .checked_mul(8 + u64::from(record_size))
            .and_then(|len| len.checked_add(u64::from(free_count) * FREE_ENTRY_LEN as u64))
            .ok_or_else(|| PersistError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("entry counts overflow: {live_count} live, {slot_count} slots"),
            })?;
        let remaining = (body.len() - reader.pos) as u64;
        if entries_len > remaining {
            return Err(PersistError::Truncated {
                path: path.to_path_buf(),
                needed: usize::try_from(entries_len - remaining).unwrap_or(usize::MAX),
            });
        }

        let mut live = Vec::with_capacity(live_count as usize);
        for _ in 0..live_count {
            let id = reader.u64()?;
            let bytes = reader.take(record_size as usize)?.to_vec();
            live.push(LiveRecord { id, bytes });
        }

        let mut free = Vec::with_capacity(free_count as usize);
        for _ in 0..free_count {
            let index = reader.u32()?;
            let generation = reader.u32()?;
            free.push(FreeSlot { index, generation });
        }

        if reader.pos != body.len() {
            return Err(PersistError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("{} trailing bytes", body.len() - reader.pos),
            });
        }

        Ok(Self {
            record_size,
            slot_count,
            live,
            free,
        })
    }
}

/// Bounds-checked little-endian cursor.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> PersistResult<&'a [u8]> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(PersistError::Truncated {
                path: self.path.to_path_buf(),
                needed: end - self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> PersistResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> PersistResult<u64> {
        let b = self.take(8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(b);
        Ok(u64::from_le_bytes(word))
    }
}
