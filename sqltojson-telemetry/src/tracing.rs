use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Log directive used when `RUST_LOG` is not set.
const DEFAULT_LOG_DIRECTIVE: &str = "info";

static TEST_TRACING: Once = Once::new();

/// Installs the global tracing subscriber for a binary.
///
/// Logs always go to standard error because standard output may carry the exported data stream.
/// The filter is taken from `RUST_LOG`, falling back to `info`.
pub fn init_tracing(app_name: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()?;

    ::tracing::debug!(app_name, "tracing initialized");

    Ok(())
}

/// Installs a test-friendly subscriber once per process.
///
/// Output is captured by the test harness; set `RUST_LOG` to see it.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
