//! Error type for the family domain.

use kinship_state::StateError;
use kinship_types::{ErrorCode, config::ConfigError};
use snafu::Snafu;

/// Result type alias for domain operations.
pub type Result<T, E = DomainError> = std::result::Result<T, E>;

/// Errors returned by family queries, mutations and authentication.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DomainError {
    /// Persistence layer failed.
    #[snafu(context(false), display("{source}"))]
    State {
        /// The underlying state error.
        source: StateError,
    },

    /// Configuration was rejected.
    #[snafu(display("Configuration error: {source}"))]
    Config {
        /// The underlying configuration error.
        source: ConfigError,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    /// Another account already uses this email address.
    #[snafu(display("Email {email} is already registered"))]
    EmailTaken {
        /// The normalized address.
        email: String,
    },

    /// Password length is outside the configured policy.
    #[snafu(display("Password must be between {min} and {max} bytes"))]
    PasswordInvalid {
        /// Shortest accepted length.
        min: usize,
        /// Longest accepted length.
        max: usize,
    },

    /// A request argument is malformed.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// A referenced record does not exist.
    #[snafu(display("{kind} {id} not found"))]
    NotFound {
        /// Record kind, such as `person`.
        kind: &'static str,
        /// The missing id.
        id: u64,
    },

    /// No account matches the supplied email address.
    #[snafu(display("No user registered as {email}"))]
    NoUser {
        /// The normalized address.
        email: String,
    },

    /// The password does not match, or the account is suspended.
    #[snafu(display("Invalid credentials"))]
    BadCredentials,

    /// A token is malformed, unknown, already used, or badly signed.
    #[snafu(display("Invalid token"))]
    InvalidToken,

    /// A token was valid but has expired.
    #[snafu(display("Token expired"))]
    TokenExpired,

    /// Password hashing failed.
    #[snafu(display("Password hashing failed: {message}"))]
    PasswordHash {
        /// Hasher error text.
        message: String,
    },

    /// The session signing key could not be initialized.
    #[snafu(display("Session signing key rejected: {message}"))]
    SessionKey {
        /// MAC error text.
        message: String,
    },

    /// Log subscriber installation failed.
    #[snafu(display("Failed to initialize logging: {message}"))]
    Logging {
        /// Subscriber error text.
        message: String,
    },
}

impl DomainError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::State { source } => source.code(),
            DomainError::Config { .. } => ErrorCode::Config,
            DomainError::EmailTaken { .. } => ErrorCode::EmailTaken,
            DomainError::PasswordInvalid { .. } => ErrorCode::PasswordInvalid,
            DomainError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            DomainError::NotFound { .. } => ErrorCode::NotFound,
            DomainError::NoUser { .. } => ErrorCode::NoUser,
            DomainError::BadCredentials => ErrorCode::BadCredentials,
            DomainError::InvalidToken => ErrorCode::InvalidToken,
            DomainError::TokenExpired => ErrorCode::TokenExpired,
            DomainError::PasswordHash { .. }
            | DomainError::SessionKey { .. }
            | DomainError::Logging { .. } => ErrorCode::Internal,
        }
    }
}

impl From<kinship_store::Error> for DomainError {
    fn from(source: kinship_store::Error) -> Self {
        DomainError::State { source: source.into() }
    }
}
