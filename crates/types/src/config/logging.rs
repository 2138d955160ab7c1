//! Log output configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
    /// JSON when stdout is not a terminal, text otherwise.
    #[default]
    Auto,
}

/// Logging configuration.
///
/// `filter` uses `tracing` env-filter directives (`info`,
/// `kinship_store=debug,info`). `RUST_LOG` overrides it when set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directives.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

#[bon::bon]
impl LoggingConfig {
    /// Creates a new logging configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the filter is empty.
    #[builder]
    pub fn new(
        #[builder(default = default_filter())] filter: String,
        #[builder(default)] format: LogFormat,
    ) -> Result<Self, ConfigError> {
        let config = Self { filter, format };
        config.validate()?;
        Ok(config)
    }
}

impl LoggingConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the filter is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.trim().is_empty() {
            return Err(ConfigError::Validation { message: "filter must not be empty".to_string() });
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: default_filter(), format: LogFormat::default() }
    }
}

fn default_filter() -> String {
    "info".to_string()
}
