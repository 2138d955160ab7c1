//! Storage backend abstraction for the store engine.
//!
//! The backend trait abstracts the underlying byte storage, allowing both
//! file-based (production) and in-memory (testing) implementations.
//!
//! # File Layout
//!
//! ```text
//! ┌──────────────────┬───────────────────────────────────────────────┐
//! │ header (512 B)   │ journal frames ...                            │
//! └──────────────────┴───────────────────────────────────────────────┘
//!                    ^ log_start                       log_end ^
//! ```
//!
//! Only the journal bytes in `[log_start, log_end)` of the active commit
//! slot are meaningful. Anything past `log_end` is the remains of a commit
//! that never flipped the god byte and is discarded on open.
//!
//! # Crash Safety: Dual-Slot Commit
//!
//! - The header contains TWO commit slots (primary and secondary)
//! - A "god byte" indicates which slot is currently active
//! - Commits write to the INACTIVE slot, then flip the god byte
//! - Recovery reads both slots and uses the valid one

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::InMemoryBackend;

use crate::error::{Error, Result};

/// Database header size.
/// Layout: 16-byte common header + 2 × 64-byte commit slots + reserved.
pub const HEADER_SIZE: usize = 512;

/// Magic number for Kinship database files.
pub const MAGIC: &[u8; 8] = b"KINSHIP\0";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// Storage backend trait for abstracting byte-addressed I/O.
pub trait StorageBackend: Send + Sync {
    /// Reads exactly `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the read fails or runs past the end.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes `data` at `offset`, extending the storage if needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the write fails.
    fn write_at(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Truncates the storage to `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the storage cannot be resized.
    fn truncate(&self, len: u64) -> Result<()>;

    /// Flushes all writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the sync fails.
    fn sync(&self) -> Result<()>;

    /// Returns the current storage size in bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the metadata query fails.
    fn size(&self) -> Result<u64>;

    /// Reads and parses the database header.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the read fails, or a header parse error.
    fn read_header(&self) -> Result<DatabaseHeader> {
        let mut buf = vec![0u8; HEADER_SIZE];
        self.read_at(0, &mut buf)?;
        DatabaseHeader::from_bytes(&buf)
    }

    /// Writes the database header.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the write fails.
    fn write_header(&self, header: &DatabaseHeader) -> Result<()> {
        self.write_at(0, &header.to_bytes())
    }
}

/// A single commit slot describing the committed journal.
///
/// Two of these are stored in the header. The "god byte" indicates which is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSlot {
    /// Offset of the first live journal frame.
    pub log_start: u64,
    /// Offset one past the last committed journal frame.
    pub log_end: u64,
    /// Last committed transaction ID.
    pub last_txn_id: u64,
    /// Timestamp of last write (Unix epoch seconds).
    pub last_write_timestamp: u64,
    /// Checksum of this slot's fields (XXH3-64).
    pub checksum: u64,
}

impl CommitSlot {
    /// Size of a commit slot on disk (64 bytes).
    pub const SIZE: usize = 64;

    /// Size of checksum-protected region (4 × 8-byte fields before checksum).
    const CHECKSUMMED_SIZE: usize = 32;

    /// Creates a slot for an empty journal.
    pub fn empty() -> Self {
        Self { log_start: HEADER_SIZE as u64, log_end: HEADER_SIZE as u64, ..Self::default() }
    }

    fn field_bytes(&self) -> [u8; Self::CHECKSUMMED_SIZE] {
        let mut buf = [0u8; Self::CHECKSUMMED_SIZE];
        buf[0..8].copy_from_slice(&self.log_start.to_le_bytes());
        buf[8..16].copy_from_slice(&self.log_end.to_le_bytes());
        buf[16..24].copy_from_slice(&self.last_txn_id.to_le_bytes());
        buf[24..32].copy_from_slice(&self.last_write_timestamp.to_le_bytes());
        buf
    }

    /// Computes the XXH3-64 checksum of the slot fields.
    pub fn compute_checksum(&self) -> u64 {
        xxhash_rust::xxh3::xxh3_64(&self.field_bytes())
    }

    /// Serializes the slot to bytes with its stored checksum.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..Self::CHECKSUMMED_SIZE].copy_from_slice(&self.field_bytes());
        buf[32..40].copy_from_slice(&self.checksum.to_le_bytes());
        // Bytes 40-63 are reserved/padding
        buf
    }

    /// Deserializes from bytes, keeping the stored checksum.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        let field = |at: usize| buf[at..at + 8].try_into().ok().map(u64::from_le_bytes);

        Some(Self {
            log_start: field(0)?,
            log_end: field(8)?,
            last_txn_id: field(16)?,
            last_write_timestamp: field(24)?,
            checksum: field(32)?,
        })
    }

    /// Verifies the checksum and the journal bounds of this slot.
    pub fn is_valid(&self) -> bool {
        self.checksum == self.compute_checksum()
            && self.log_start >= HEADER_SIZE as u64
            && self.log_start <= self.log_end
    }

    /// Returns a copy with its checksum recomputed.
    pub fn sealed(mut self) -> Self {
        self.checksum = self.compute_checksum();
        self
    }
}

/// Database header with dual-slot commit for crash safety.
///
/// # Layout (512 bytes total)
///
/// - Bytes 0-15: Common header (magic, version, reserved, god_byte)
/// - Bytes 16-79: Commit slot 0 (64 bytes)
/// - Bytes 80-143: Commit slot 1 (64 bytes)
/// - Bytes 144-511: Reserved
///
/// The god byte (byte 15) determines which slot is primary:
/// - Bit 0: Primary slot index (0 or 1)
/// - Bit 1: Recovery flag (set by the first commit after open, cleared on clean close)
///
/// # Commit Sequence
///
/// 1. Append the journal frame after `log_end` and sync.
/// 2. Write the new bounds into the secondary slot and sync. The primary is
///    untouched, so a crash here recovers the previous commit.
/// 3. Flip the god byte and sync. This single byte is the commit point.
///
/// On open both slots are read; the one named by the god byte is tried first
/// and the other is used if its checksum fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHeader {
    /// Magic number: "KINSHIP\0"
    pub magic: [u8; 8],
    /// Format version.
    pub version: u16,
    /// God byte: bit 0 = primary slot, bit 1 = recovery flag.
    pub god_byte: u8,
    /// Commit slot 0.
    pub slot0: CommitSlot,
    /// Commit slot 1.
    pub slot1: CommitSlot,
}

impl DatabaseHeader {
    /// Offset of the god byte in the header.
    pub const GOD_BYTE_OFFSET: usize = 15;

    /// Bit mask for primary slot index in god byte.
    pub const GOD_BYTE_SLOT_MASK: u8 = 0x01;

    /// Bit mask for recovery flag in god byte.
    pub const GOD_BYTE_RECOVERY_MASK: u8 = 0x02;

    const SLOT0_OFFSET: usize = 16;
    const SLOT1_OFFSET: usize = Self::SLOT0_OFFSET + CommitSlot::SIZE;

    /// Creates a header for an empty database.
    pub fn new() -> Self {
        Self {
            magic: *MAGIC,
            version: FORMAT_VERSION,
            god_byte: 0,
            slot0: CommitSlot::empty().sealed(),
            slot1: CommitSlot::empty().sealed(),
        }
    }

    /// Returns the index of the primary (active) slot.
    pub fn primary_slot_index(&self) -> usize {
        (self.god_byte & Self::GOD_BYTE_SLOT_MASK) as usize
    }

    /// Returns the index of the secondary (inactive) slot.
    pub fn secondary_slot_index(&self) -> usize {
        1 - self.primary_slot_index()
    }

    /// Returns a reference to a slot by index.
    pub fn slot(&self, index: usize) -> &CommitSlot {
        if index == 0 { &self.slot0 } else { &self.slot1 }
    }

    /// Returns a reference to the primary (active) commit slot.
    pub fn primary_slot(&self) -> &CommitSlot {
        self.slot(self.primary_slot_index())
    }

    /// Replaces the secondary (inactive) commit slot.
    pub fn set_secondary_slot(&mut self, slot: CommitSlot) {
        let slot = slot.sealed();
        if self.secondary_slot_index() == 0 { self.slot0 = slot } else { self.slot1 = slot }
    }

    /// Flips the primary slot (toggle bit 0 of god byte).
    pub fn flip_primary_slot(&mut self) {
        self.god_byte ^= Self::GOD_BYTE_SLOT_MASK;
    }

    /// Checks whether the previous session ended without a clean close.
    pub fn recovery_required(&self) -> bool {
        (self.god_byte & Self::GOD_BYTE_RECOVERY_MASK) != 0
    }

    /// Sets or clears the recovery flag.
    pub fn set_recovery_required(&mut self, required: bool) {
        if required {
            self.god_byte |= Self::GOD_BYTE_RECOVERY_MASK;
        } else {
            self.god_byte &= !Self::GOD_BYTE_RECOVERY_MASK;
        }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..8].copy_from_slice(&self.magic);
        buf[8..10].copy_from_slice(&self.version.to_le_bytes());
        // Bytes 10-14 reserved
        buf[Self::GOD_BYTE_OFFSET] = self.god_byte;

        let slot0 = Self::SLOT0_OFFSET;
        let slot1 = Self::SLOT1_OFFSET;
        buf[slot0..slot0 + CommitSlot::SIZE].copy_from_slice(&self.slot0.to_bytes());
        buf[slot1..slot1 + CommitSlot::SIZE].copy_from_slice(&self.slot1.to_bytes());

        buf
    }

    /// Deserializes from bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corrupted` if the buffer is too short.
    /// Returns `Error::InvalidMagic` if the magic number does not match.
    /// Returns `Error::UnsupportedVersion` if the format version is unsupported.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::Corrupted { reason: "Header too short".to_string() });
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&buf[0..8]);
        if magic != *MAGIC {
            return Err(Error::InvalidMagic);
        }

        let version = u16::from_le_bytes([buf[8], buf[9]]);
        if version > FORMAT_VERSION {
            return Err(Error::UnsupportedVersion { version });
        }

        let slot = |offset: usize, index: u8| {
            CommitSlot::from_bytes(&buf[offset..offset + CommitSlot::SIZE]).ok_or_else(|| {
                Error::Corrupted { reason: format!("Failed to parse commit slot {index}") }
            })
        };

        Ok(Self {
            magic,
            version,
            god_byte: buf[Self::GOD_BYTE_OFFSET],
            slot0: slot(Self::SLOT0_OFFSET, 0)?,
            slot1: slot(Self::SLOT1_OFFSET, 1)?,
        })
    }

    /// Validates the header and determines which slot to use.
    ///
    /// If the indicated primary slot has an invalid checksum, tries the secondary.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corrupted` if both commit slots are invalid.
    pub fn validate_and_choose_slot(&self) -> Result<usize> {
        let primary = self.primary_slot_index();
        let secondary = self.secondary_slot_index();

        if self.slot(primary).is_valid() {
            return Ok(primary);
        }
        if self.slot(secondary).is_valid() {
            return Ok(secondary);
        }

        Err(Error::Corrupted { reason: "Both commit slots have invalid checksums".to_string() })
    }
}

impl Default for DatabaseHeader {
    fn default() -> Self {
        Self::new()
    }
}
