use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize a tracing subscriber writing to test stdout, once per process.
/// Call at the top of any test whose assertions depend on log output, or
/// simply to see what pkglab logged while debugging a failing test.
pub fn init() {
    INIT.call_once(|| {
        let _ = tracing_log::LogTracer::init();
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
            .with_test_writer()
            .try_init();
    });
}
