//! Error type for the state layer.

use kinship_store::StoreId;
use kinship_types::{CodecError, ErrorCode, PackError};
use snafu::Snafu;

/// Result type alias for state operations.
pub type Result<T, E = StateError> = std::result::Result<T, E>;

/// Errors returned by buckets, indexes, collections and the schema.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StateError {
    /// Underlying storage operation failed.
    #[snafu(context(false), display("Storage error: {source}"))]
    Store {
        /// The underlying store error.
        source: kinship_store::Error,
    },

    /// A stored value could not be packed or unpacked.
    #[snafu(display("Record codec error in bucket {bucket}: {source}"))]
    Pack {
        /// Bucket holding the value.
        bucket: String,
        /// The underlying pack error.
        source: PackError,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    /// Internal bookkeeping value could not be encoded or decoded.
    #[snafu(display("Codec error in bucket {bucket}: {source}"))]
    Codec {
        /// Bucket holding the value.
        bucket: String,
        /// The underlying codec error.
        source: CodecError,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    /// A stored key does not decode with the bucket's key encoding.
    #[snafu(display("Malformed key in bucket {bucket}: {key:02x?}"))]
    KeyDecode {
        /// Bucket holding the key.
        bucket: String,
        /// The raw key bytes.
        key: Vec<u8>,
    },

    /// Two declarations used the same bucket name.
    #[snafu(display("Bucket {name} is declared twice"))]
    DuplicateDeclaration {
        /// The contested name.
        name: String,
    },

    /// A bucket name is empty, too long, or reserved.
    #[snafu(display("Invalid bucket name {name:?}: {reason}"))]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A handle bound to one store was used with a transaction from another.
    #[snafu(display("Transaction belongs to {actual} but the handle is bound to {expected}"))]
    ForeignTransaction {
        /// Store the handle was declared on.
        expected: StoreId,
        /// Store the transaction came from.
        actual: StoreId,
    },

    /// The ID allocator ran out of integers.
    #[snafu(display("No identifiers left in bucket {bucket}"))]
    IdExhausted {
        /// The exhausted bucket.
        bucket: String,
    },
}

impl StateError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            StateError::Store { source } => source.code(),
            StateError::Pack { .. } | StateError::Codec { .. } => ErrorCode::RecordEncoding,
            StateError::KeyDecode { .. } => ErrorCode::KeyEncoding,
            StateError::DuplicateDeclaration { .. } => ErrorCode::SchemaDuplicate,
            StateError::InvalidName { .. } => ErrorCode::InvalidArgument,
            StateError::ForeignTransaction { .. } => ErrorCode::StoreForeignTransaction,
            StateError::IdExhausted { .. } => ErrorCode::IdExhausted,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_keeps_its_code() {
        let err: StateError = kinship_store::Error::BucketNotFound { name: "people".to_string() }.into();
        assert_eq!(err.code(), ErrorCode::StoreBucketMissing);
        assert_eq!(err.to_string(), "Storage error: Bucket not found: people");
    }

    #[test]
    fn test_duplicate_declaration_code() {
        let err = StateError::DuplicateDeclaration { name: "users".to_string() };
        assert_eq!(err.code(), ErrorCode::SchemaDuplicate);
        assert!(err.to_string().contains("users"));
    }
}
