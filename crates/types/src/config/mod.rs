//! Configuration types for Kinship.
//!
//! Configuration is loaded from JSON. All config structs validate their
//! values at construction time via fallible builders. Post-deserialization
//! validation is available via the `validate()` method on each struct.

mod auth;
mod logging;
mod store;

pub use auth::*;
pub use logging::*;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
pub use store::*;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range or
/// violates a cross-field constraint.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// The configuration document could not be parsed.
    #[snafu(display("malformed config: {source}"))]
    Parse {
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// Top-level application configuration.
///
/// Initialized once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Embedded store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Password and token settings.
    pub auth: AuthConfig,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Validation`] for out-of-range values.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Validation`] encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.auth.validate()?;
        self.logging.validate()
    }
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
