//! Process-wide log subscriber installation.

use std::io::IsTerminal;

use kinship_types::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{DomainError, Result};

/// Whether `format` resolves to JSON output in this process.
pub fn uses_json(format: LogFormat) -> bool {
    match format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !std::io::stdout().is_terminal(),
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. Supports three formats:
/// - `Text`: human-readable lines
/// - `Json`: one flattened JSON object per event
/// - `Auto`: JSON for non-TTY stdout, text otherwise
///
/// # Errors
///
/// Returns [`DomainError::Logging`] if the filter does not parse or a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| DomainError::Logging { message: e.to_string() })?,
    };

    let installed = if uses_json(config.format) {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .try_init()
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).try_init()
    };
    installed.map_err(|e| DomainError::Logging { message: e.to_string() })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_formats() {
        assert!(uses_json(LogFormat::Json));
        assert!(!uses_json(LogFormat::Text));
    }

    #[test]
    fn test_second_install_fails() {
        let config = LoggingConfig::default();
        // Another test in this binary may have installed one already.
        let _ = init_logging(&config);
        assert!(matches!(init_logging(&config), Err(DomainError::Logging { .. })));
    }
}
