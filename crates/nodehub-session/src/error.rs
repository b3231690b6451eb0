/*!
 * Error types for the NodeHub session crate.
 */
use thiserror::Error;

use nodehub_core::types::Id;

use crate::connection::ConnectionPhase;
use crate::transport::TransportError;

/// Error type for hub session operations
#[derive(Error, Debug)]
pub enum Error {
    /// The operation referenced a device the registry has never seen
    #[error("Unknown device: {0}")]
    UnknownDevice(Id),

    /// A conflicting phase transition is already in flight for the device
    #[error("Operation already in progress for device {device} (phase {phase})")]
    AlreadyInProgress {
        /// The device ID
        device: Id,
        /// The phase the device was in when the command arrived
        phase: ConnectionPhase,
    },

    /// Disconnect was requested on a device that is not connected
    #[error("Device {device} is not connected (phase {phase})")]
    NotConnected {
        /// The device ID
        device: Id,
        /// The phase the device was in when the command arrived
        phase: ConnectionPhase,
    },

    /// The transport reported a failure
    #[error("Transport failure after {attempts} attempt(s): {message}")]
    Transport {
        /// The underlying transport error message
        message: String,
        /// Connection attempts since the last success, 0 for non-connection operations
        attempts: u32,
    },

    /// The configured connection capacity is exhausted
    #[error("Connection capacity exhausted (limit {limit})")]
    CapacityExhausted {
        /// The configured limit
        limit: usize,
    },

    /// A payload did not conform to the advertisement wire format
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] nodehub_core::error::Error),
}

/// Result type for hub session operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new unknown-device error
    pub fn unknown_device(device: &Id) -> Self {
        Error::UnknownDevice(device.clone())
    }

    /// Create a new already-in-progress error
    pub fn already_in_progress(device: &Id, phase: ConnectionPhase) -> Self {
        Error::AlreadyInProgress {
            device: device.clone(),
            phase,
        }
    }

    /// Create a new not-connected error
    pub fn not_connected(device: &Id, phase: ConnectionPhase) -> Self {
        Error::NotConnected {
            device: device.clone(),
            phase,
        }
    }

    /// Create a new transport-failure error
    pub fn transport<S: AsRef<str>>(message: S, attempts: u32) -> Self {
        Error::Transport {
            message: message.as_ref().to_string(),
            attempts,
        }
    }

    /// Create a new capacity-exhausted error
    pub fn capacity(limit: usize) -> Self {
        Error::CapacityExhausted { limit }
    }

    /// Create a new protocol error
    pub fn protocol<S: AsRef<str>>(msg: S) -> Self {
        Error::Protocol(msg.as_ref().to_string())
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::transport(err.to_string(), 0)
    }
}
