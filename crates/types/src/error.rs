//! Stable, machine-readable error codes.
//!
//! Each crate defines its own snafu error enum; every variant maps to one of
//! the codes below through a `code()` accessor so the handler layer can turn
//! failures into responses without matching on error internals.

/// Machine-readable error codes.
///
/// | Range       | Domain     | Examples                                  |
/// |-------------|------------|-------------------------------------------|
/// | 1000–1199   | Store      | Open, lock, transaction, corruption       |
/// | 2000–2099   | State      | Schema declaration, key and record codecs |
/// | 3000–3099   | Validation | Duplicate email, weak password            |
/// | 4000–4099   | Auth       | Invalid or expired token, unknown user    |
/// | 5000–5099   | Internal   | Configuration, unexpected failures        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // --- Store errors (1000–1199) ---
    /// Database file could not be opened or created.
    StoreOpen = 1000,
    /// Database file is locked by another process.
    StoreLocked = 1001,
    /// Transaction commit or lock acquisition failed.
    StoreTransaction = 1002,
    /// Bucket does not exist.
    StoreBucketMissing = 1003,
    /// Transaction handle belongs to a different store.
    StoreForeignTransaction = 1004,
    /// Data corruption detected (checksum mismatch, invalid structure).
    StoreCorruption = 1100,
    /// Underlying I/O failure.
    StoreIo = 1101,

    // --- State errors (2000–2099) ---
    /// Bucket or index name declared twice.
    SchemaDuplicate = 2000,
    /// Bucket or index used without being declared.
    SchemaUndeclared = 2001,
    /// Stored key does not decode with its declared encoding.
    KeyEncoding = 2002,
    /// Stored record does not decode with its codec.
    RecordEncoding = 2003,
    /// Id space of a bucket is exhausted.
    IdExhausted = 2004,

    // --- Validation errors (3000–3099) ---
    /// Email address already registered.
    EmailTaken = 3000,
    /// Password does not satisfy length requirements.
    PasswordInvalid = 3001,
    /// Request argument is malformed.
    InvalidArgument = 3002,
    /// Referenced record does not exist.
    NotFound = 3003,

    // --- Auth errors (4000–4099) ---
    /// Token is malformed, unknown, or has a bad signature.
    InvalidToken = 4000,
    /// Token has expired.
    TokenExpired = 4001,
    /// No user matches the supplied identity.
    NoUser = 4002,
    /// Password does not match.
    BadCredentials = 4003,

    // --- Internal errors (5000–5099) ---
    /// Configuration is invalid.
    Config = 5000,
    /// Unexpected internal failure.
    Internal = 5001,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::StoreOpen),
            1001 => Some(Self::StoreLocked),
            1002 => Some(Self::StoreTransaction),
            1003 => Some(Self::StoreBucketMissing),
            1004 => Some(Self::StoreForeignTransaction),
            1100 => Some(Self::StoreCorruption),
            1101 => Some(Self::StoreIo),
            2000 => Some(Self::SchemaDuplicate),
            2001 => Some(Self::SchemaUndeclared),
            2002 => Some(Self::KeyEncoding),
            2003 => Some(Self::RecordEncoding),
            2004 => Some(Self::IdExhausted),
            3000 => Some(Self::EmailTaken),
            3001 => Some(Self::PasswordInvalid),
            3002 => Some(Self::InvalidArgument),
            3003 => Some(Self::NotFound),
            4000 => Some(Self::InvalidToken),
            4001 => Some(Self::TokenExpired),
            4002 => Some(Self::NoUser),
            4003 => Some(Self::BadCredentials),
            5000 => Some(Self::Config),
            5001 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Whether the caller caused this error and should fix the request.
    ///
    /// Client errors surface as 4xx responses; everything else is a server
    /// fault.
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        matches!(
            self,
            Self::EmailTaken
                | Self::PasswordInvalid
                | Self::InvalidArgument
                | Self::NotFound
                | Self::InvalidToken
                | Self::TokenExpired
                | Self::NoUser
                | Self::BadCredentials
        )
    }

    /// Whether the operation may succeed if retried unchanged.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::StoreTransaction | Self::StoreIo | Self::StoreLocked)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    const ALL: &[ErrorCode] = &[
        ErrorCode::StoreOpen,
        ErrorCode::StoreLocked,
        ErrorCode::StoreTransaction,
        ErrorCode::StoreBucketMissing,
        ErrorCode::StoreForeignTransaction,
        ErrorCode::StoreCorruption,
        ErrorCode::StoreIo,
        ErrorCode::SchemaDuplicate,
        ErrorCode::SchemaUndeclared,
        ErrorCode::KeyEncoding,
        ErrorCode::RecordEncoding,
        ErrorCode::IdExhausted,
        ErrorCode::EmailTaken,
        ErrorCode::PasswordInvalid,
        ErrorCode::InvalidArgument,
        ErrorCode::NotFound,
        ErrorCode::InvalidToken,
        ErrorCode::TokenExpired,
        ErrorCode::NoUser,
        ErrorCode::BadCredentials,
        ErrorCode::Config,
        ErrorCode::Internal,
    ];

    #[test]
    fn test_from_u16_covers_every_code() {
        for code in ALL {
            assert_eq!(ErrorCode::from_u16(code.as_u16()), Some(*code));
        }
        assert_eq!(ErrorCode::from_u16(9999), None);
    }

    #[test]
    fn test_validation_and_auth_are_client_errors() {
        for code in ALL {
            let expected = (3000..5000).contains(&code.as_u16());
            assert_eq!(code.is_client_error(), expected, "{code:?}");
        }
    }

    #[test]
    fn test_display_is_numeric() {
        assert_eq!(ErrorCode::EmailTaken.to_string(), "3000");
    }
}
