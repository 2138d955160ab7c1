//! In-memory storage backend for testing.

use parking_lot::RwLock;

use super::{DatabaseHeader, HEADER_SIZE, StorageBackend};
use crate::error::Result;

/// In-memory storage backend.
///
/// All data is lost when the backend is dropped. Sync is a no-op.
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a backend holding an empty database.
    pub fn new() -> Self {
        Self { data: RwLock::new(DatabaseHeader::new().to_bytes().to_vec()) }
    }

    /// Returns a copy of the raw contents, header included.
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Builds a backend from raw contents, as if reopening a file.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { data: RwLock::new(bytes) }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.data.read();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("read of {}..{} past end {}", start, end, data.len()),
            )
            .into());
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut data = self.data.write();
        let start = offset as usize;
        let end = start + bytes.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        let len = (len as usize).max(HEADER_SIZE);
        self.data.write().resize(len, 0);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.read().len() as u64)
    }
}
