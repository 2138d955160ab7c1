//! Embedded store configuration: durability and journal compaction.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Smallest journal size that may trigger compaction: 4 KB.
const MIN_COMPACTION_BYTES: u64 = 4096;

/// Store configuration.
///
/// # Validation Rules
///
/// - `compaction_min_bytes` must be >= 4096
/// - `compaction_garbage_ratio` must be in `(0.0, 1.0]`
///
/// # Example
///
/// ```no_run
/// # use kinship_types::config::StoreConfig;
/// let config = StoreConfig::builder()
///     .sync_on_commit(false)
///     .compaction_min_bytes(1024 * 1024)
///     .build()
///     .expect("valid store config");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Whether every commit calls `fsync` before returning.
    ///
    /// Disabling this trades durability of the most recent commits for
    /// throughput; atomicity is unaffected.
    #[serde(default = "default_sync_on_commit")]
    pub sync_on_commit: bool,
    /// Journal size below which compaction never runs.
    #[serde(default = "default_compaction_min_bytes")]
    pub compaction_min_bytes: u64,
    /// Fraction of the journal that must be superseded writes before the
    /// store rewrites it as a snapshot.
    #[serde(default = "default_compaction_garbage_ratio")]
    pub compaction_garbage_ratio: f64,
}

#[bon::bon]
impl StoreConfig {
    /// Creates a new store configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    #[builder]
    pub fn new(
        #[builder(default = default_sync_on_commit())] sync_on_commit: bool,
        #[builder(default = default_compaction_min_bytes())] compaction_min_bytes: u64,
        #[builder(default = default_compaction_garbage_ratio())] compaction_garbage_ratio: f64,
    ) -> Result<Self, ConfigError> {
        let config = Self { sync_on_commit, compaction_min_bytes, compaction_garbage_ratio };
        config.validate()?;
        Ok(config)
    }
}

impl StoreConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compaction_min_bytes < MIN_COMPACTION_BYTES {
            return Err(ConfigError::Validation {
                message: format!(
                    "compaction_min_bytes must be >= {}, got {}",
                    MIN_COMPACTION_BYTES, self.compaction_min_bytes
                ),
            });
        }
        if !(self.compaction_garbage_ratio > 0.0 && self.compaction_garbage_ratio <= 1.0) {
            return Err(ConfigError::Validation {
                message: format!(
                    "compaction_garbage_ratio must be in (0.0, 1.0], got {}",
                    self.compaction_garbage_ratio
                ),
            });
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: default_sync_on_commit(),
            compaction_min_bytes: default_compaction_min_bytes(),
            compaction_garbage_ratio: default_compaction_garbage_ratio(),
        }
    }
}

fn default_sync_on_commit() -> bool {
    true
}

fn default_compaction_min_bytes() -> u64 {
    4 * 1024 * 1024 // 4 MB
}

fn default_compaction_garbage_ratio() -> f64 {
    0.5
}
