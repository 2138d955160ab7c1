//! Postcard helpers for internal bookkeeping values.
//!
//! Records go through [`crate::pack`]. Values that never need schema
//! evolution (reverse index entries, migration markers, session claims) use
//! postcard through these functions so errors stay uniform.

use serde::{Serialize, de::DeserializeOwned};
use snafu::Snafu;

/// Error type for codec operations.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// Encoding failed.
    #[snafu(display("Encoding failed: {source}"))]
    Encode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// Decoding failed.
    #[snafu(display("Decoding failed: {source}"))]
    Decode {
        /// The underlying postcard error.
        source: postcard::Error,
    },
}

/// Encodes a value to bytes using postcard serialization.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|source| CodecError::Encode { source })
}

/// Decodes bytes to a value using postcard deserialization.
///
/// # Errors
///
/// Returns `CodecError::Decode` if deserialization fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|source| CodecError::Decode { source })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::types::PersonId;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Edges {
        target: PersonId,
        terms: Vec<(Vec<u8>, Vec<u8>)>,
    }

    #[test]
    fn test_roundtrip_nested_byte_pairs() {
        let original = Edges {
            target: PersonId::new(12),
            terms: vec![(vec![0, 0, 0, 5], vec![0x80, 1]), (vec![], vec![])],
        };
        let bytes = encode(&original).expect("encode edges");
        let decoded: Edges = decode(&bytes).expect("decode edges");
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_decode_truncated_fails() {
        let bytes = encode(&vec![1u64, 2, 3]).unwrap();
        let result: Result<Vec<u64>, _> = decode(&bytes[..2]);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_error_display() {
        let err = decode::<String>(&[0xFF]).unwrap_err();
        assert!(err.to_string().starts_with("Decoding failed"));
    }
}
