//! Shared test utilities for Kinship crates.
//!
//! This crate provides common test helpers to reduce boilerplate across test modules:
//!
//! - [`TestDir`] - Managed temporary directory with path helpers
//! - [`CrashInjector`] - Deterministic I/O failures inside the commit sequence
//! - [`strategies`] - Proptest generators for keys, names and credentials
//! - [`init_test_tracing`] - Captured log output for tests

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod test_dir;
pub use test_dir::TestDir;

mod crash_injector;
pub use crash_injector::{CrashInjector, CrashPoint};

pub mod strategies;

mod tracing_init;
pub use tracing_init::init_test_tracing;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // ============================================
    // TestDir tests
    // ============================================

    #[test]
    fn test_dir_creates_temp_directory() {
        let dir = TestDir::new();
        assert!(dir.path().exists(), "temp directory should exist");
        assert!(dir.path().is_dir(), "should be a directory");
    }

    #[test]
    fn test_dir_join_creates_subdirectory_path() {
        let dir = TestDir::new();
        let subpath = dir.join("data/kinship.db");
        assert!(subpath.starts_with(dir.path()));
        assert!(subpath.ends_with("data/kinship.db"));
    }

    #[test]
    fn test_dir_cleanup_on_drop() {
        let path = {
            let dir = TestDir::new();
            let p = dir.path().to_path_buf();
            std::fs::write(p.join("file.txt"), "data").expect("write file");
            assert!(p.exists());
            p
        };
        assert!(!path.exists(), "temp directory should be cleaned up on drop");
    }

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }
}
