//! Log capture for tests.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Installs a test-friendly subscriber once per process.
///
/// Output goes through the test harness's capture, so it only shows for
/// failing tests. `RUST_LOG` selects the level, defaulting to `warn`.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // A subscriber installed by another harness is fine to keep.
        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}
