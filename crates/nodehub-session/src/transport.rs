/*!
 * Transport contract for NodeHub.
 *
 * The session core performs no radio I/O of its own; every scan, connect,
 * and disconnect is delegated to an implementation of the [`Transport`]
 * trait supplied by the embedding application.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use nodehub_core::types::Id;

/// Error reported by a transport implementation.
///
/// Transports reduce their failures to a message; the connection manager
/// wraps it with the attempt count when surfacing it to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    /// Create a new transport error
    pub fn new<S: AsRef<str>>(msg: S) -> Self {
        Self(msg.as_ref().to_string())
    }
}

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// A raw device advertisement observed during a scan sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    /// Stable device identifier (hardware address)
    pub id: Id,
    /// Advertised name, if the scan response carried one
    pub name: Option<String>,
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Battery estimate in percent, if advertised
    pub battery: Option<u8>,
    /// Last sensor sample carried in the advertisement, if any
    pub last_reading: Option<f64>,
    /// Fault bitfield from the advertisement payload
    pub fault_flags: u8,
}

impl Advertisement {
    /// Create an advertisement carrying only the mandatory fields
    pub fn new<I: Into<Id>>(id: I, rssi: i16) -> Self {
        Self {
            id: id.into(),
            name: None,
            rssi,
            battery: None,
            last_reading: None,
            fault_flags: 0,
        }
    }

    /// Set the advertised name
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the battery estimate
    pub fn with_battery(mut self, percent: u8) -> Self {
        self.battery = Some(percent);
        self
    }

    /// The label to display for this device.
    ///
    /// Falls back to a name derived from the trailing octets of the
    /// address when the advertisement carried none, matching the node
    /// naming convention (`Node-F215` for `...:F2:15`).
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let hex: String = self
            .id
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .collect();
        if hex.len() >= 4 {
            format!("Node-{}", hex[hex.len() - 4..].to_uppercase())
        } else {
            format!("Node-{}", self.id)
        }
    }
}

/// The external collaborator performing radio-level discovery and
/// connection.
///
/// All methods are asynchronous; the core never blocks a command loop on
/// them. Implementations must be safe to share across tasks.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Perform one scan sweep and return the advertisements observed
    async fn scan_for_devices(&self) -> TransportResult<Vec<Advertisement>>;

    /// Establish a link to the given device
    async fn connect_to(&self, id: &Id) -> TransportResult<()>;

    /// Tear down the link to the given device
    async fn disconnect_from(&self, id: &Id) -> TransportResult<()>;
}
