/*!
 * Device records.
 *
 * This module defines the record the registry keeps for every sensor
 * node observed during the session, and its merge semantics across
 * rediscoveries.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nodehub_core::types::Id;

use crate::protocol::fault_flags;
use crate::transport::Advertisement;

/// A device observed during the current session.
///
/// The identifier is fixed at creation; every other field carries the
/// most recent observation and is overwritten on rediscovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable device identifier (hardware address)
    pub id: Id,
    /// Human-readable label, may change across rediscoveries
    pub display_name: String,
    /// Last observed signal strength in dBm
    pub signal_strength: i16,
    /// Battery estimate in percent, absent if unknown
    pub battery_level: Option<u8>,
    /// Last sensor sample carried in the advertisement, if any
    pub last_reading: Option<f64>,
    /// Fault bitfield from the advertisement payload
    pub fault_flags: u8,
    /// Timestamp of the most recent discovery or update
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    /// Create a record from the first advertisement of a device
    pub fn from_advertisement(adv: &Advertisement) -> Self {
        Self {
            id: adv.id.clone(),
            display_name: adv.display_name(),
            signal_strength: adv.rssi,
            battery_level: adv.battery,
            last_reading: adv.last_reading,
            fault_flags: adv.fault_flags,
            last_seen: Utc::now(),
        }
    }

    /// Merge a rediscovery into this record, last write wins.
    ///
    /// The identifier is never touched; callers only merge
    /// advertisements carrying the same id.
    pub fn merge_from(&mut self, adv: &Advertisement) {
        debug_assert_eq!(self.id, adv.id);
        self.display_name = adv.display_name();
        self.signal_strength = adv.rssi;
        self.battery_level = adv.battery;
        self.last_reading = adv.last_reading;
        self.fault_flags = adv.fault_flags;
        self.last_seen = Utc::now();
    }

    /// Whether any fault flag is raised
    pub fn has_fault(&self) -> bool {
        self.fault_flags != 0
    }

    /// Whether the node reported a critically low battery
    pub fn is_low_battery(&self) -> bool {
        self.fault_flags & fault_flags::LOW_BATTERY != 0
    }
}
