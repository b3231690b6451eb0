/*!
 * Device registry.
 *
 * This module provides the authoritative in-memory set of devices
 * observed in the current session.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use nodehub_core::error::Error as CoreError;
use nodehub_core::types::Id;

use crate::device::DeviceRecord;
use crate::error::{Error, Result};
use crate::transport::Advertisement;

/// Capacity of the registry event channel
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Event types for the device registry
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A device was seen for the first time this session
    DeviceDiscovered(DeviceRecord),
    /// A known device was rediscovered and its record merged
    DeviceUpdated(DeviceRecord),
    /// The registry was emptied on session teardown
    RegistryCleared,
}

#[derive(Debug, Default)]
struct RegistryInner {
    /// Records keyed by device ID
    records: HashMap<Id, DeviceRecord>,
    /// Insertion order of device IDs, for deterministic listings
    order: Vec<Id>,
}

/// Device registry
#[derive(Debug)]
pub struct DeviceRegistry {
    /// The known devices
    inner: RwLock<RegistryInner>,
    /// Event sender for registry events
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    /// Create a new device registry
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(RegistryInner::default()),
            event_sender,
        }
    }

    /// Insert a new record or merge an advertisement into an existing
    /// one, keyed by device ID.
    ///
    /// Returns whether the device was newly discovered. Merging is
    /// last-write-wins; the ID itself never changes.
    pub fn upsert(&self, adv: &Advertisement) -> Result<bool> {
        let mut inner = self.inner.write().map_err(|_| {
            CoreError::runtime("Failed to acquire write lock on device registry")
        })?;

        if let Some(record) = inner.records.get_mut(&adv.id) {
            record.merge_from(adv);
            let record = record.clone();
            drop(inner);
            debug!("Updated device {}", adv.id);
            let _ = self.event_sender.send(RegistryEvent::DeviceUpdated(record));
            return Ok(false);
        }

        let record = DeviceRecord::from_advertisement(adv);
        inner.records.insert(adv.id.clone(), record.clone());
        inner.order.push(adv.id.clone());
        drop(inner);
        debug!("Discovered device {}", adv.id);
        let _ = self
            .event_sender
            .send(RegistryEvent::DeviceDiscovered(record));
        Ok(true)
    }

    /// Get a record by device ID
    pub fn get(&self, id: &Id) -> Result<DeviceRecord> {
        let inner = self.inner.read().map_err(|_| {
            CoreError::runtime("Failed to acquire read lock on device registry")
        })?;

        inner
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| Error::unknown_device(id))
    }

    /// Get all known records, in insertion order
    pub fn list(&self) -> Result<Vec<DeviceRecord>> {
        let inner = self.inner.read().map_err(|_| {
            CoreError::runtime("Failed to acquire read lock on device registry")
        })?;

        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .cloned()
            .collect())
    }

    /// Get all known device IDs, in insertion order
    pub fn ids(&self) -> Result<Vec<Id>> {
        let inner = self.inner.read().map_err(|_| {
            CoreError::runtime("Failed to acquire read lock on device registry")
        })?;

        Ok(inner.order.clone())
    }

    /// Count known devices
    pub fn len(&self) -> Result<usize> {
        let inner = self.inner.read().map_err(|_| {
            CoreError::runtime("Failed to acquire read lock on device registry")
        })?;

        Ok(inner.records.len())
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Check whether a device is known
    pub fn contains(&self, id: &Id) -> Result<bool> {
        let inner = self.inner.read().map_err(|_| {
            CoreError::runtime("Failed to acquire read lock on device registry")
        })?;

        Ok(inner.records.contains_key(id))
    }

    /// Empty the registry; used only on session teardown
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| {
            CoreError::runtime("Failed to acquire write lock on device registry")
        })?;

        inner.records.clear();
        inner.order.clear();
        drop(inner);
        debug!("Registry cleared");
        let _ = self.event_sender.send(RegistryEvent::RegistryCleared);
        Ok(())
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared device registry that can be cloned
#[derive(Debug, Clone, Default)]
pub struct SharedDeviceRegistry(Arc<DeviceRegistry>);

impl SharedDeviceRegistry {
    /// Create a new shared device registry
    pub fn new() -> Self {
        Self(Arc::new(DeviceRegistry::new()))
    }

    /// Get a reference to the device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.0
    }
}

impl AsRef<DeviceRegistry> for SharedDeviceRegistry {
    fn as_ref(&self) -> &DeviceRegistry {
        self.registry()
    }
}
