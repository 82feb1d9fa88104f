//! Tracing subscriber setup for binaries and tests
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global fmt subscriber filtered by `RUST_LOG` (default `info`)
pub fn init_logging() {
    // Already initialized (tests, embedding host)
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
    tracing::debug!(target = "probe", "tracing initialized");
}
