//! Error types for the store engine.

use std::{io, path::PathBuf};

use kinship_types::ErrorCode;
use snafu::Snafu;

/// Result type alias for store operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur during store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// I/O error from the underlying storage backend.
    #[snafu(display("I/O error: {source}"))]
    Io {
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The database file is locked by another process (or another handle in
    /// this one).
    #[snafu(display("Database {} is locked by another process: {source}", path.display()))]
    Locked {
        /// Path of the lock file.
        path: PathBuf,
        /// The error returned by the lock attempt.
        source: io::Error,
    },

    /// Database file is corrupted or has invalid format.
    #[snafu(display("Corrupted database: {reason}"))]
    Corrupted {
        /// Description of what was corrupted.
        reason: String,
    },

    /// Invalid magic number in database header.
    #[snafu(display("Invalid database magic number"))]
    InvalidMagic,

    /// Unsupported database format version.
    #[snafu(display("Unsupported format version: {version}"))]
    UnsupportedVersion {
        /// The unsupported version number.
        version: u16,
    },

    /// The named bucket does not exist.
    #[snafu(display("Bucket not found: {name}"))]
    BucketNotFound {
        /// Name of the missing bucket.
        name: String,
    },

    /// Bucket names must be non-empty and at most 255 bytes.
    #[snafu(display("Invalid bucket name: {name:?}"))]
    InvalidBucketName {
        /// The rejected name.
        name: String,
    },

    /// The write transaction was already committed or aborted.
    #[snafu(display("Transaction already finished"))]
    TransactionFinished,

    /// Internal lock was poisoned (another thread panicked while holding it).
    #[snafu(display("Internal lock poisoned"))]
    Poisoned,
}

impl Error {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Io { .. } => ErrorCode::StoreIo,
            Error::Locked { .. } => ErrorCode::StoreLocked,
            Error::Corrupted { .. } | Error::InvalidMagic | Error::UnsupportedVersion { .. } => {
                ErrorCode::StoreCorruption
            },
            Error::BucketNotFound { .. } => ErrorCode::StoreBucketMissing,
            Error::InvalidBucketName { .. } => ErrorCode::InvalidArgument,
            Error::TransactionFinished | Error::Poisoned => ErrorCode::StoreTransaction,
        }
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::Io { source }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.code(), ErrorCode::StoreIo);
        assert_eq!(err.to_string(), "I/O error: denied");
    }

    #[test]
    fn test_bucket_not_found_display() {
        let err = Error::BucketNotFound { name: "people".to_string() };
        assert_eq!(err.to_string(), "Bucket not found: people");
        assert_eq!(err.code(), ErrorCode::StoreBucketMissing);
    }

    #[test]
    fn test_corruption_variants_share_code() {
        assert_eq!(Error::InvalidMagic.code(), ErrorCode::StoreCorruption);
        assert_eq!(Error::UnsupportedVersion { version: 9 }.code(), ErrorCode::StoreCorruption);
    }
}
