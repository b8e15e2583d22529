//! Logging bootstrap
//!
//! Structured logging via `tracing`, configured once at startup. The filter
//! comes from `RUST_LOG` with an `info` default.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber. Subsequent calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
