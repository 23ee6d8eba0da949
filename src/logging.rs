//! Structured logging setup.
//!
//! Helpers for wiring up the `tracing` ecosystem. Everything goes to
//! **stderr** so stdout stays free for whatever the host process puts
//! there. Filtering follows the `RUST_LOG` environment variable
//! (e.g. `info`, `debug`, `nimbus_provider_sdk=debug`), defaulting to
//! `info` when unset.
//!
//! ```ignore
//! use nimbus_provider_sdk::init_logging;
//!
//! fn main() {
//!     init_logging();
//!     tracing::info!("provider starting");
//! }
//! ```

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the default subscriber: compact stderr output filtered by
/// `RUST_LOG`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set; use
/// [`try_init_logging`] where that is not certain.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer())
        .init();
}

/// Like [`init_logging`], but returns `false` instead of panicking when a
/// subscriber is already installed. Useful in tests, where many entry
/// points race to initialize once per process.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer())
        .try_init()
        .is_ok()
}
