//! Logging infrastructure for Colloquy
//!
//! Shared tracing-subscriber setup for both binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with an env-filter.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to the
/// crate and `info` to everything else.
pub fn init(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("colloquy={log_level},info").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
