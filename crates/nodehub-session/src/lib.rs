/*!
 * NodeHub Session
 *
 * This crate provides the session core of the NodeHub test hub: the
 * device registry, the connection manager, and the transport contract
 * they drive.
 */

#![warn(missing_docs)]

// Re-export core types
pub use nodehub_core::prelude;

pub mod connection;
pub mod device;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

// Re-export the session surface
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionPhase, ConnectionState};
pub use device::DeviceRecord;
pub use error::{Error, Result};
pub use registry::{DeviceRegistry, RegistryEvent, SharedDeviceRegistry};
pub use session::HubSession;
pub use transport::{Advertisement, Transport, TransportError, TransportResult};

/// NodeHub session crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the session system
pub fn init() -> std::result::Result<(), nodehub_core::error::Error> {
    tracing::info!("NodeHub Session {} initialized", VERSION);
    Ok(())
}
