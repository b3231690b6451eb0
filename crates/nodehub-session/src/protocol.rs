/*!
 * Sensor-node advertisement wire format.
 *
 * Nodes broadcast a compact manufacturer-data payload inside their BLE
 * advertising packets. This module decodes and encodes that payload so
 * transports can turn raw scan data into [`Advertisement`]s without
 * duplicating the layout.
 *
 * Layout, little-endian, 17 bytes total: company id (u16), format
 * version (u8), node address (6 bytes), battery percent (u8), last
 * reading (f32), fault flags (u8), freshness counter (u16).
 */
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use nodehub_core::types::Id;

use crate::error::{Error, Result};
use crate::transport::Advertisement;

/// Manufacturer company identifier carried by node advertisements
pub const SENSOR_COMPANY_ID: u16 = 0x0059;

/// Current advertisement format version
pub const ADV_VERSION: u8 = 1;

/// Size of the advertisement payload in bytes
pub const ADV_PAYLOAD_LEN: usize = 17;

/// Fault flag bits carried in the advertisement payload
pub mod fault_flags {
    /// Reading above the configured range
    pub const SENSOR_HIGH: u8 = 0x01;
    /// Reading below the configured range
    pub const SENSOR_LOW: u8 = 0x02;
    /// Sensor element not responding
    pub const SENSOR_DISCONNECTED: u8 = 0x04;
    /// ADC input saturated
    pub const ADC_SATURATION: u8 = 0x08;
    /// Battery below the critical threshold
    pub const LOW_BATTERY: u8 = 0x10;
    /// Node rebooted by its watchdog
    pub const WATCHDOG_RESET: u8 = 0x20;
    /// Stored configuration failed its checksum
    pub const CONFIG_CORRUPT: u8 = 0x40;
}

/// A decoded sensor-node advertisement payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAdvertisement {
    /// Manufacturer company identifier
    pub company_id: u16,
    /// Advertisement format version
    pub version: u8,
    /// Node hardware address
    pub node_id: Id,
    /// Battery estimate in percent
    pub battery_percent: u8,
    /// Last sensor sample in engineering units
    pub last_reading: f32,
    /// Fault bitfield, see [`fault_flags`]
    pub fault_flags: u8,
    /// Freshness counter, increments on each sample
    pub counter: u16,
}

impl NodeAdvertisement {
    /// Decode an advertisement payload.
    ///
    /// Fails with a protocol error when the payload is shorter than
    /// [`ADV_PAYLOAD_LEN`]; trailing bytes are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ADV_PAYLOAD_LEN {
            return Err(Error::protocol(format!(
                "advertisement payload too short: {} bytes, expected {}",
                data.len(),
                ADV_PAYLOAD_LEN
            )));
        }

        let mut buf = data;
        let company_id = buf.get_u16_le();
        let version = buf.get_u8();

        let mut addr = [0u8; 6];
        buf.copy_to_slice(&mut addr);
        let node_id = Id::from_string(
            addr.iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(":"),
        );

        let battery_percent = buf.get_u8();
        let last_reading = buf.get_f32_le();
        let fault_flags = buf.get_u8();
        let counter = buf.get_u16_le();

        Ok(Self {
            company_id,
            version,
            node_id,
            battery_percent,
            last_reading,
            fault_flags,
            counter,
        })
    }

    /// Encode this payload into its 17-byte wire form.
    ///
    /// Fails with a protocol error when `node_id` is not a 6-octet
    /// colon-separated hardware address.
    pub fn encode(&self) -> Result<Bytes> {
        let octets: Vec<&str> = self.node_id.as_str().split(':').collect();
        if octets.len() != 6 {
            return Err(Error::protocol(format!(
                "node id {} is not a 6-octet address",
                self.node_id
            )));
        }

        let mut buf = BytesMut::with_capacity(ADV_PAYLOAD_LEN);
        buf.put_u16_le(self.company_id);
        buf.put_u8(self.version);
        for octet in octets {
            let byte = u8::from_str_radix(octet, 16).map_err(|_| {
                Error::protocol(format!("invalid octet {:?} in node id {}", octet, self.node_id))
            })?;
            buf.put_u8(byte);
        }
        buf.put_u8(self.battery_percent);
        buf.put_f32_le(self.last_reading);
        buf.put_u8(self.fault_flags);
        buf.put_u16_le(self.counter);

        Ok(buf.freeze())
    }

    /// Whether any fault flag is raised
    pub fn has_fault(&self) -> bool {
        self.fault_flags != 0
    }

    /// Convert into a scan [`Advertisement`] with the observed RSSI
    pub fn into_advertisement(self, rssi: i16) -> Advertisement {
        Advertisement {
            id: self.node_id,
            name: None,
            rssi,
            battery: Some(self.battery_percent),
            last_reading: Some(f64::from(self.last_reading)),
            fault_flags: self.fault_flags,
        }
    }
}
