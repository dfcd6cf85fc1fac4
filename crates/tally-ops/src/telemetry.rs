//! # Tracing Setup
//!
//! Installs the global `tracing` subscriber.
//!
//! ## Filtering
//! - `RUST_LOG=debug` - everything at debug
//! - `RUST_LOG=tally_ops=trace,sqlx=info` - per-crate levels
//! - Unset: `[logging] filter` from the config, else
//!   `info,tally_ops=debug,tally_db=debug,sqlx=warn`

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "info,tally_ops=debug,tally_db=debug,sqlx=warn";

/// Builds the filter: `RUST_LOG` first, then the configured directives.
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = settings.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    })
}

/// Installs the fmt subscriber, plain or JSON.
///
/// Returns false if a global subscriber was already set (tests, embedding
/// hosts); the existing one stays in place.
pub fn init_tracing(settings: &LoggingSettings) -> bool {
    let filter = env_filter(settings);

    let result = if settings.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    result.is_ok()
}
