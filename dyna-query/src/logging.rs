//! Logging setup driven by environment variables.
//!
//! # Environment Variables
//!
//! - `DYNA_DEBUG=true|1|yes` - Enable debug logging
//! - `DYNA_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `DYNA_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! ```rust,no_run
//! use dyna_query::logging;
//!
//! // Call once at startup
//! logging::init();
//! ```
//!
//! Inside the crate the plain `tracing` macros are used; this module only
//! decides whether and how a subscriber is installed.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `DYNA_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("DYNA_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `DYNA_LOG_LEVEL`.
///
/// Defaults to "debug" if `DYNA_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("DYNA_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Get the configured log format from `DYNA_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    env::var("DYNA_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize logging. Subsequent calls are no-ops.
///
/// Nothing is installed unless `DYNA_DEBUG` or `DYNA_LOG_LEVEL` is set, so an
/// application that brings its own subscriber is left alone.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("DYNA_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "dyna_orm={},dyna_query={}",
                level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            // try_init: a host application may already own the global subscriber
            let installed = match get_log_format() {
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                "pretty" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = level,
                    format = get_log_format(),
                    "dyna logging initialized"
                );
            }
        }
    });
}

/// Initialize logging with a specific level.
///
/// # Safety
///
/// Modifies process environment; call before spawning threads.
pub fn init_with_level(level: &str) {
    // SAFETY: intended to be called at program startup only.
    unsafe {
        env::set_var("DYNA_LOG_LEVEL", level);
    }
    init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_defaults() {
        // SAFETY: the only test in this crate touching these variables
        unsafe {
            env::remove_var("DYNA_DEBUG");
            env::remove_var("DYNA_LOG_LEVEL");
            env::remove_var("DYNA_LOG_FORMAT");
        }
        assert!(!is_debug_enabled());
        assert_eq!(get_log_level(), "warn");
        assert_eq!(get_log_format(), "json");
    }
}
