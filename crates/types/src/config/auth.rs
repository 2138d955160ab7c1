//! Password policy and token lifetimes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Shortest password length any policy may allow.
pub const PASSWORD_FLOOR: usize = 8;

/// Longest password length any policy may allow.
pub const PASSWORD_CEILING: usize = 72;

/// Minimum HMAC secret length in bytes.
const MIN_SECRET_LEN: usize = 32;

/// Authentication configuration.
///
/// # Validation Rules
///
/// - `session_secret` must be at least 32 bytes
/// - `8 <= password_min_len <= password_max_len <= 72`
/// - `session_ttl`, `refresh_ttl` and `reset_ttl` must be non-zero
/// - argon2 costs must satisfy `memory_kib >= 8 * parallelism`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Key used to sign session tokens.
    pub session_secret: String,
    /// Lifetime of a signed session token.
    #[serde(default = "default_session_ttl")]
    #[serde(with = "super::humantime_serde")]
    pub session_ttl: Duration,
    /// Lifetime of a refresh token.
    #[serde(default = "default_refresh_ttl")]
    #[serde(with = "super::humantime_serde")]
    pub refresh_ttl: Duration,
    /// Lifetime of a password reset token.
    #[serde(default = "default_reset_ttl")]
    #[serde(with = "super::humantime_serde")]
    pub reset_ttl: Duration,
    /// Shortest accepted password, in bytes.
    #[serde(default = "default_password_min_len")]
    pub password_min_len: usize,
    /// Longest accepted password, in bytes.
    #[serde(default = "default_password_max_len")]
    pub password_max_len: usize,
    /// Argon2 memory cost in KiB.
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,
    /// Argon2 iteration count.
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,
    /// Argon2 lane count.
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,
}

#[bon::bon]
impl AuthConfig {
    /// Creates a new authentication configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    #[builder]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_secret: String,
        #[builder(default = default_session_ttl())] session_ttl: Duration,
        #[builder(default = default_refresh_ttl())] refresh_ttl: Duration,
        #[builder(default = default_reset_ttl())] reset_ttl: Duration,
        #[builder(default = default_password_min_len())] password_min_len: usize,
        #[builder(default = default_password_max_len())] password_max_len: usize,
        #[builder(default = default_argon2_memory_kib())] argon2_memory_kib: u32,
        #[builder(default = default_argon2_iterations())] argon2_iterations: u32,
        #[builder(default = default_argon2_parallelism())] argon2_parallelism: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            session_secret,
            session_ttl,
            refresh_ttl,
            reset_ttl,
            password_min_len,
            password_max_len,
            argon2_memory_kib,
            argon2_iterations,
            argon2_parallelism,
        };
        config.validate()?;
        Ok(config)
    }
}

impl AuthConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Validation {
                message: format!(
                    "session_secret must be at least {} bytes, got {}",
                    MIN_SECRET_LEN,
                    self.session_secret.len()
                ),
            });
        }
        if self.password_min_len < PASSWORD_FLOOR
            || self.password_max_len > PASSWORD_CEILING
            || self.password_min_len > self.password_max_len
        {
            return Err(ConfigError::Validation {
                message: format!(
                    "password length bounds must satisfy {} <= min <= max <= {}, got {}..={}",
                    PASSWORD_FLOOR, PASSWORD_CEILING, self.password_min_len, self.password_max_len
                ),
            });
        }
        for (name, ttl) in [
            ("session_ttl", self.session_ttl),
            ("refresh_ttl", self.refresh_ttl),
            ("reset_ttl", self.reset_ttl),
        ] {
            if ttl.is_zero() {
                return Err(ConfigError::Validation { message: format!("{name} must be non-zero") });
            }
        }
        if self.argon2_iterations == 0
            || self.argon2_parallelism == 0
            || self.argon2_memory_kib < 8 * self.argon2_parallelism
        {
            return Err(ConfigError::Validation {
                message: format!(
                    "argon2 costs invalid: memory {} KiB, {} iterations, {} lanes",
                    self.argon2_memory_kib, self.argon2_iterations, self.argon2_parallelism
                ),
            });
        }
        Ok(())
    }
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(15 * 60) // 15 minutes
}

fn default_refresh_ttl() -> Duration {
    Duration::from_secs(30 * 24 * 3600) // 30 days
}

fn default_reset_ttl() -> Duration {
    Duration::from_secs(3600) // 1 hour
}

fn default_password_min_len() -> usize {
    PASSWORD_FLOOR
}

fn default_password_max_len() -> usize {
    PASSWORD_CEILING
}

fn default_argon2_memory_kib() -> u32 {
    19 * 1024
}

fn default_argon2_iterations() -> u32 {
    2
}

fn default_argon2_parallelism() -> u32 {
    1
}
