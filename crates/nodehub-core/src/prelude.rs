/*!
 * Prelude module for NodeHub Core.
 *
 * This module re-exports commonly used types and functions from the NodeHub Core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::Id;

// Re-export config types
pub use crate::config::{
    Config, ConfigBuilder, ConnectionConfig, GeneralConfig, LoggingConfig, ScanConfig,
    SharedConfig,
};

// Re-export logging helpers
pub use crate::logging::{component_span, init_from_config, init_with_filter};
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
