//! Tracing initialization.
//!
//! Structured, async-aware logging built on `tracing` and
//! `tracing-subscriber`. The library itself only emits events; binaries
//! (and tests that want output) call [`init`] once at startup. Filtering
//! follows `RUST_LOG` when set, falling back to the given default level.
//!
//! # Example
//! ```no_run
//! use tracing::info;
//!
//! ppcl550::tracing_setup::init("info");
//! info!("starting up");
//! ```

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber with `RUST_LOG` filtering.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
