//! Exclusive process lock on a database file.
//!
//! A sidecar `<db>.lock` file is locked with an OS-level exclusive lock
//! (`flock` on Unix, `LockFileEx` on Windows). The lock is released when the
//! [`StoreLock`] is dropped, or by the OS if the process dies.

use std::{
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// An exclusive lock held for the lifetime of an open database.
pub struct StoreLock {
    file: std::fs::File,
    path: PathBuf,
}

impl StoreLock {
    /// Returns the lock file path for a database file.
    pub fn lock_path_for(db_path: &Path) -> PathBuf {
        let mut name = db_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        db_path.with_file_name(name)
    }

    /// Acquires the lock for `db_path` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] if another handle holds the lock and
    /// [`Error::Io`] if the lock file cannot be created.
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let path = Self::lock_path_for(db_path);
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "Acquired database lock");
                Ok(Self { file, path })
            },
            Err(source) if is_contended(&source) => {
                warn!(path = %path.display(), "Database is already locked");
                Err(Error::Locked { path, source })
            },
            Err(source) => Err(Error::Io { source }),
        }
    }

    /// Returns the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `EWOULDBLOCK` surfaces as 11 on Linux and 35 on macOS when the kind is not mapped.
fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock || matches!(err.raw_os_error(), Some(11) | Some(35))
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release database lock");
        } else {
            debug!(path = %self.path.display(), "Released database lock");
        }
    }
}
