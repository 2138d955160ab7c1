//! Temporary directories for store files.

// Test utilities panic on setup failure
#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// File name used by [`TestDir::store_path`].
const STORE_FILE: &str = "kinship.db";

/// A temporary directory removed when dropped.
///
/// ```
/// use kinship_test_utils::TestDir;
///
/// let dir = TestDir::new();
/// let path = dir.store_path();
/// assert!(path.starts_with(dir.path()));
/// ```
pub struct TestDir {
    inner: TempDir,
}

impl TestDir {
    /// Creates a fresh directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let inner =
            tempfile::Builder::new().prefix("kinship-").tempdir().expect("failed to create temp directory");
        Self { inner }
    }

    /// Path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// `path` joined onto the directory.
    #[must_use]
    pub fn join<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.inner.path().join(path)
    }

    /// Conventional location of a store file inside the directory.
    ///
    /// The file itself is not created.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.join(STORE_FILE)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
