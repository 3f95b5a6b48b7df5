//! Logging setup.
//!
//! Logs go to **stderr** through `tracing`; stdout carries nothing but the
//! handshake line the host parses.
//!
//! `RUST_LOG` controls filtering, for example:
//!
//! ```bash
//! # Default
//! RUST_LOG=info hemmer-provider-fastly
//!
//! # Trace every Fastly request the provider makes
//! RUST_LOG=hemmer_provider_fastly::fastly=debug hemmer-provider-fastly
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LEVEL: &str = "info";

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Install the global subscriber with the `info` default.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Install the global subscriber, using `default_level` when `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Like [`init_logging`], but returns `false` instead of panicking when a
/// subscriber is already installed.
pub fn try_init_logging() -> bool {
    subscriber(DEFAULT_LEVEL).try_init().is_ok()
}
