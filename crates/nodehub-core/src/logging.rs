/*!
 * Logging functionality for NodeHub.
 *
 * This module provides tracing setup and utilities for consistent logging
 * across the hub crates.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "nodehub=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Initialize the logging system from a logging configuration section
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    if !config.stdout {
        return Ok(());
    }
    init_with_filter(&config.level)
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a new span for a component
///
/// # Arguments
///
/// * `name` - The name of the component
/// * `id` - An optional ID for the component instance
pub fn component_span(name: &str, id: Option<&str>) -> Span {
    match id {
        Some(id) => tracing::info_span!("component", name = %name, id = %id),
        None => tracing::info_span!("component", name = %name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        // This will fail if called multiple times in the same process
        // but it's fine for a single test
        let _ = init();
    }

    #[test]
    fn test_init_from_config_disabled_stdout() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            stdout: false,
            json_format: false,
        };
        assert!(init_from_config(&config).is_ok());
    }

    #[test]
    fn test_component_span() {
        let span = component_span("session", Some("123"));
        assert!(span.is_none()); // Span is not entered so is_none() should be true

        let span = component_span("session", None);
        assert!(span.is_none());
    }
}
