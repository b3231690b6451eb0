//! Walkthrough of a hub session against a simulated field of sensor
//! nodes: scan, auto-connect, inspect, tear down.
//!
//! The simulated transport stands in for the radio; a real deployment
//! implements the same trait over its BLE stack.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use nodehub_core::types::Id;
use nodehub_session::protocol::{fault_flags, NodeAdvertisement, ADV_VERSION, SENSOR_COMPANY_ID};
use nodehub_session::{
    Advertisement, ConnectionEvent, HubSession, Transport, TransportError, TransportResult,
};

/// A transport that advertises two simulated nodes and accepts every
/// link except the one to a node that is out of range.
#[derive(Debug)]
struct SimulatedField {
    out_of_range: Id,
}

#[async_trait]
impl Transport for SimulatedField {
    async fn scan_for_devices(&self) -> TransportResult<Vec<Advertisement>> {
        // First node: healthy, advertisement assembled from its wire payload
        let healthy = NodeAdvertisement {
            company_id: SENSOR_COMPANY_ID,
            version: ADV_VERSION,
            node_id: Id::from("dc:a6:32:a3:f2:15"),
            battery_percent: 95,
            last_reading: 21.4,
            fault_flags: 0,
            counter: 1700,
        };
        let wire = healthy.encode().map_err(|e| TransportError::new(e.to_string()))?;
        let healthy = NodeAdvertisement::parse(&wire)
            .map_err(|e| TransportError::new(e.to_string()))?
            .into_advertisement(-45);

        // Second node: low battery, currently out of range for connects
        let mut weak = Advertisement::new(self.out_of_range.clone(), -88).with_battery(9);
        weak.fault_flags = fault_flags::LOW_BATTERY;

        Ok(vec![healthy, weak])
    }

    async fn connect_to(&self, id: &Id) -> TransportResult<()> {
        if *id == self.out_of_range {
            Err(TransportError::new("no response within connection window"))
        } else {
            Ok(())
        }
    }

    async fn disconnect_from(&self, _id: &Id) -> TransportResult<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nodehub_core::init()?;

    let transport = Arc::new(SimulatedField {
        out_of_range: Id::from("e1:b4:27:c5:d8:91"),
    });
    let session = HubSession::new(transport);

    // Watch connection events in the background
    let mut events = session.subscribe_connections();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ConnectionEvent::PhaseChanged {
                device_id,
                new_phase,
                ..
            } = event
            {
                info!("{} -> {}", device_id, new_phase);
            }
        }
    });

    // Scan the field and show what we found
    let records = session.scan().await?;
    for record in &records {
        info!(
            "node {} rssi {} dBm battery {:?} faulted: {}",
            record.display_name, record.signal_strength, record.battery_level, record.has_fault()
        );
    }

    // Auto-connect to everything in sight
    for (id, result) in session.connect_all().await? {
        match result {
            Ok(()) => info!("{} connected", id),
            Err(e) => info!("{} unreachable: {}", id, e),
        }
    }
    info!("active links: {}", session.list_active()?.len());

    // Release the healthy node and wind the session down
    let healthy = Id::from("dc:a6:32:a3:f2:15");
    session.disconnect(&healthy)?;
    session.teardown()?;

    Ok(())
}
