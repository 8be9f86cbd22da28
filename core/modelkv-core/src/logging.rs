//! Logging utilities for modelkv
//!
//! Provides helpers for initializing tracing subscribers. The engine itself
//! only emits `tracing` events; a host application decides where they go.
//!
//! Useful targets:
//! - `modelkv_core::query::planner` (debug): chosen access path and ordering
//! - `modelkv_core::engine::catalog` (info/warn): table provisioning
//! - `modelkv_core::overflow` (warn): rows still over budget after eviction

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging with default settings
///
/// # Environment Variables
/// - `RUST_LOG` - Log level filter (default: "info")
///
/// # Example
/// ```rust
/// modelkv_core::logging::init();
/// tracing::info!(models = 3, "registry loaded");
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a specific level
///
/// `RUST_LOG` still wins when it is set. Calling this twice is harmless.
///
/// # Example
/// ```rust
/// // planner decisions are logged at debug level
/// modelkv_core::logging::init_with_level("modelkv_core::query=debug,info");
/// ```
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();
}

/// Initialize logging for tests
///
/// Planner decisions are logged at debug level, so that is the default here.
///
/// # Example
/// ```rust
/// modelkv_core::logging::init_test();
/// modelkv_core::logging::init_test(); // already installed: no-op
/// ```
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("modelkv_core=debug"))
        .with_test_writer()
        .try_init();
}

// Stub implementations when logging feature is disabled
#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_test();
        init_with_level("debug");
        init();
        init_test();
        tracing::debug!(table = "tradle_Widget", "after repeated init");
    }
}
