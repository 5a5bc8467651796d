//! Logging and tracing utilities.
//!
//! Sets up structured logging via the `tracing` ecosystem. All logs go
//! to **stderr**: when the provider runs as a host-spawned plugin,
//! stdout belongs to the host protocol.
//!
//! Filtering follows the `RUST_LOG` environment variable:
//!
//! ```bash
//! # Show info logs (default)
//! RUST_LOG=info ./ovh-provider
//!
//! # Debug the provider only
//! RUST_LOG=ovh_provider=debug ./ovh-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the default logging subscriber.
///
/// Writes to stderr, respects `RUST_LOG`, defaults to `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .init();
}

/// Try to initialize logging, returning false if a subscriber was
/// already set. Useful in tests, where initialization may race.
pub fn try_init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("ovh_provider=debug").is_ok());
        assert!(EnvFilter::try_new("warn,ovh_provider=trace").is_ok());
    }

    #[test]
    fn test_try_init_is_idempotent() {
        // Whichever test initializes first wins; the second attempt must
        // report failure instead of panicking.
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
