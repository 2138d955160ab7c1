//! File-based storage backend using position-based I/O (`pread`/`pwrite`).
//!
//! On Unix, reads never take a lock: `read_exact_at()` takes `&self` and
//! does not touch the file cursor. Writes and resizes are serialized via a
//! unit [`parking_lot::Mutex`] so a journal append cannot interleave with a
//! truncation.

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use super::{DatabaseHeader, HEADER_SIZE, StorageBackend};
use crate::error::Result;

/// File-based storage backend.
///
/// Durability requires the caller to invoke [`sync`](StorageBackend::sync)
/// after writes. Crash safety comes from the dual-slot commit protocol in
/// [`DatabaseHeader`], not from this backend alone.
pub struct FileBackend {
    file: File,
    /// Serializes writes and resize operations.
    write_lock: Mutex<()>,
    path: PathBuf,
}

impl FileBackend {
    /// Opens an existing database file and validates its header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the file cannot be opened or read.
    /// Returns [`Error::InvalidMagic`](crate::Error::InvalidMagic) if the file is not a
    /// Kinship database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let backend =
            Self { file, write_lock: Mutex::new(()), path: path.as_ref().to_path_buf() };
        backend.read_header()?;
        Ok(backend)
    }

    /// Creates a new database file containing only an empty header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the file cannot be created or written.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let backend =
            Self { file, write_lock: Mutex::new(()), path: path.as_ref().to_path_buf() };
        backend.write_header(&DatabaseHeader::new())?;
        backend.file.sync_all()?;
        Ok(backend)
    }

    /// Returns the path this backend was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        read_exact_at_offset(&self.file, buf, offset)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock();
        write_all_at_offset(&self.file, data, offset)
    }

    fn truncate(&self, len: u64) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.file.set_len(len.max(HEADER_SIZE as u64))?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

// ---------------------------------------------------------------------------
// Platform-specific position-based I/O helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn read_exact_at_offset(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    file.read_exact_at(buf, offset)?;
    Ok(())
}

/// `seek_read` moves the cursor on Windows; reads are still positional.
#[cfg(windows)]
fn read_exact_at_offset(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut pos = 0;
    while pos < buf.len() {
        let n = file.seek_read(&mut buf[pos..], offset + pos as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "unexpected end of file during seek_read",
            )
            .into());
        }
        pos += n;
    }
    Ok(())
}

#[cfg(unix)]
fn write_all_at_offset(file: &File, data: &[u8], offset: u64) -> Result<()> {
    file.write_all_at(data, offset)?;
    Ok(())
}

#[cfg(windows)]
fn write_all_at_offset(file: &File, data: &[u8], offset: u64) -> Result<()> {
    let mut pos = 0;
    while pos < data.len() {
        let n = file.seek_write(&data[pos..], offset + pos as u64)?;
        pos += n;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::Error;

    #[test]
    fn test_create_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("family.db");
        let backend = FileBackend::create(&path).unwrap();

        assert_eq!(backend.size().unwrap(), HEADER_SIZE as u64);
        assert_eq!(backend.read_header().unwrap(), DatabaseHeader::new());
        assert_eq!(backend.path(), path.as_path());
    }

    #[test]
    fn test_write_past_end_extends_file() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::create(dir.path().join("family.db")).unwrap();

        backend.write_at(HEADER_SIZE as u64 + 10, b"frame").unwrap();
        assert_eq!(backend.size().unwrap(), HEADER_SIZE as u64 + 15);

        let mut buf = [0u8; 5];
        backend.read_at(HEADER_SIZE as u64 + 10, &mut buf).unwrap();
        assert_eq!(&buf, b"frame");
    }

    #[test]
    fn test_truncate_never_cuts_header() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::create(dir.path().join("family.db")).unwrap();
        backend.write_at(HEADER_SIZE as u64, &[1; 100]).unwrap();

        backend.truncate(0).unwrap();
        assert_eq!(backend.size().unwrap(), HEADER_SIZE as u64);
        assert!(backend.read_header().is_ok());
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, vec![b'x'; HEADER_SIZE]).unwrap();

        assert!(matches!(FileBackend::open(&path), Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(FileBackend::open(dir.path().join("absent.db")), Err(Error::Io { .. })));
    }
}
