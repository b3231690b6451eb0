/*!
 * Connection manager.
 *
 * This module owns the per-device connection lifecycle: it serializes
 * commands against asynchronous transport results, enforces at most one
 * in-flight transition per device, and bounds every attempt with the
 * configured timeout.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, info, warn};

use nodehub_core::config::SharedConfig;
use nodehub_core::error::Error as CoreError;
use nodehub_core::types::Id;

use crate::error::{Error, Result};
use crate::registry::SharedDeviceRegistry;
use crate::transport::Transport;

/// Capacity of the connection event channel
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// The lifecycle phase of a device connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionPhase {
    /// No link and no transition in flight
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// The link is established
    Connected,
    /// A disconnect is awaiting transport acknowledgment
    Disconnecting,
    /// The most recent attempt failed; a reissued connect retries
    Failed,
}

impl ConnectionPhase {
    /// Whether a transition is currently in flight
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ConnectionPhase::Connecting | ConnectionPhase::Disconnecting)
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Disconnected => "Disconnected",
            ConnectionPhase::Connecting => "Connecting",
            ConnectionPhase::Connected => "Connected",
            ConnectionPhase::Disconnecting => "Disconnecting",
            ConnectionPhase::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// The connection lifecycle state of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// The device ID
    pub device_id: Id,
    /// Current lifecycle phase
    pub phase: ConnectionPhase,
    /// Connection attempts since the last success
    pub attempt_count: u32,
    /// Message of the most recent transport failure, if any
    pub last_error: Option<String>,
}

impl ConnectionState {
    /// The state of a device that has never been the target of a command
    pub fn disconnected(device_id: Id) -> Self {
        Self {
            device_id,
            phase: ConnectionPhase::Disconnected,
            attempt_count: 0,
            last_error: None,
        }
    }
}

/// Event types for the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A device moved to a new lifecycle phase
    PhaseChanged {
        /// The device ID
        device_id: Id,
        /// The old phase
        old_phase: ConnectionPhase,
        /// The new phase
        new_phase: ConnectionPhase,
    },
    /// A connection attempt failed or timed out
    ConnectFailed {
        /// The device ID
        device_id: Id,
        /// Attempts since the last success, including this one
        attempts: u32,
        /// The transport failure message
        message: String,
    },
}

#[derive(Debug)]
struct Entry {
    phase: ConnectionPhase,
    attempt_count: u32,
    last_error: Option<String>,
}

impl Entry {
    fn new() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            attempt_count: 0,
            last_error: None,
        }
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection table plus the teardown epoch guarding late results.
#[derive(Debug, Default)]
struct ConnTable {
    entries: HashMap<Id, Entry>,
    epoch: u64,
}

#[derive(Debug)]
struct ManagerInner {
    table: RwLock<ConnTable>,
    event_sender: broadcast::Sender<ConnectionEvent>,
}

impl ManagerInner {
    fn publish_phase(&self, device_id: &Id, old_phase: ConnectionPhase, new_phase: ConnectionPhase) {
        let _ = self.event_sender.send(ConnectionEvent::PhaseChanged {
            device_id: device_id.clone(),
            old_phase,
            new_phase,
        });
    }

    /// Apply the outcome of an in-flight connect, unless the session was
    /// torn down (epoch mismatch) or the entry moved on in the meantime.
    fn apply_connect_result(
        &self,
        device_id: &Id,
        task_epoch: u64,
        result: std::result::Result<(), String>,
    ) {
        let mut table = match self.table.write() {
            Ok(table) => table,
            Err(_) => {
                warn!("Connection table lock poisoned, dropping transport result");
                return;
            }
        };

        if table.epoch != task_epoch {
            debug!("Dropping stale connect result for {}", device_id);
            return;
        }

        let entry = match table.entries.get_mut(device_id) {
            Some(entry) if entry.phase == ConnectionPhase::Connecting => entry,
            _ => {
                debug!("Dropping connect result for {}: no pending attempt", device_id);
                return;
            }
        };

        match result {
            Ok(()) => {
                entry.phase = ConnectionPhase::Connected;
                entry.attempt_count = 0;
                entry.last_error = None;
                drop(table);
                info!("Connected to {}", device_id);
                self.publish_phase(device_id, ConnectionPhase::Connecting, ConnectionPhase::Connected);
            }
            Err(message) => {
                entry.attempt_count += 1;
                entry.phase = ConnectionPhase::Failed;
                entry.last_error = Some(message.clone());
                let attempts = entry.attempt_count;
                drop(table);
                warn!(
                    "Connection attempt {} to {} failed: {}",
                    attempts, device_id, message
                );
                self.publish_phase(device_id, ConnectionPhase::Connecting, ConnectionPhase::Failed);
                let _ = self.event_sender.send(ConnectionEvent::ConnectFailed {
                    device_id: device_id.clone(),
                    attempts,
                    message,
                });
            }
        }
    }

    /// Apply the outcome of an in-flight disconnect. The phase always
    /// settles at Disconnected; a transport failure only means the link
    /// died without an acknowledgment.
    fn apply_disconnect_result(
        &self,
        device_id: &Id,
        task_epoch: u64,
        result: std::result::Result<(), String>,
    ) {
        let mut table = match self.table.write() {
            Ok(table) => table,
            Err(_) => {
                warn!("Connection table lock poisoned, dropping transport result");
                return;
            }
        };

        if table.epoch != task_epoch {
            debug!("Dropping stale disconnect result for {}", device_id);
            return;
        }

        let entry = match table.entries.get_mut(device_id) {
            Some(entry) if entry.phase == ConnectionPhase::Disconnecting => entry,
            _ => {
                debug!("Dropping disconnect result for {}: no pending disconnect", device_id);
                return;
            }
        };

        entry.phase = ConnectionPhase::Disconnected;
        if let Err(message) = result {
            warn!("Disconnect from {} failed, link considered dead: {}", device_id, message);
            entry.last_error = Some(message);
        }
        drop(table);
        info!("Disconnected from {}", device_id);
        self.publish_phase(
            device_id,
            ConnectionPhase::Disconnecting,
            ConnectionPhase::Disconnected,
        );
    }
}

/// Connection manager
///
/// Cloning is cheap and every clone drives the same connection table.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    registry: SharedDeviceRegistry,
    transport: Arc<dyn Transport>,
    config: SharedConfig,
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Create a new connection manager over a registry and a transport
    pub fn new(
        registry: SharedDeviceRegistry,
        transport: Arc<dyn Transport>,
        config: SharedConfig,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry,
            transport,
            config,
            inner: Arc::new(ManagerInner {
                table: RwLock::new(ConnTable::default()),
                event_sender,
            }),
        }
    }

    /// Begin connecting to a registered device.
    ///
    /// Returns as soon as the attempt is in flight; completion is
    /// reported through [`ConnectionEvent`]s and [`status`](Self::status).
    /// Fails with `UnknownDevice` for ids the registry has never seen
    /// (without creating a connection entry), `AlreadyInProgress` while
    /// a transition is in flight, and `CapacityExhausted` at the
    /// configured link limit. A connect on an already connected device
    /// is a no-op.
    pub fn connect(&self, id: &Id) -> Result<()> {
        if !self.registry.registry().contains(id)? {
            return Err(Error::unknown_device(id));
        }

        let task_epoch;
        let old_phase;
        {
            let mut table = self.inner.table.write().map_err(|_| {
                CoreError::runtime("Failed to acquire write lock on connection table")
            })?;

            if let Some(entry) = table.entries.get(id) {
                if entry.phase.is_in_flight() {
                    return Err(Error::already_in_progress(id, entry.phase));
                }
                if entry.phase == ConnectionPhase::Connected {
                    debug!("Device {} already connected", id);
                    return Ok(());
                }
            }

            let limit = self.config.get().connection.max_connections;
            if limit > 0 {
                let active = table
                    .entries
                    .values()
                    .filter(|e| e.phase.is_in_flight() || e.phase == ConnectionPhase::Connected)
                    .count();
                if active >= limit {
                    return Err(Error::capacity(limit));
                }
            }

            task_epoch = table.epoch;
            let entry = table.entries.entry(id.clone()).or_default();
            old_phase = entry.phase;
            entry.phase = ConnectionPhase::Connecting;
        }

        info!("Connecting to {}", id);
        self.inner.publish_phase(id, old_phase, ConnectionPhase::Connecting);

        let inner = Arc::clone(&self.inner);
        let transport = Arc::clone(&self.transport);
        let timeout = self.config.get().connection.connect_timeout();
        let device = id.clone();
        tokio::spawn(async move {
            let result = match time::timeout(timeout, transport.connect_to(&device)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("attempt timed out after {} ms", timeout.as_millis())),
            };
            inner.apply_connect_result(&device, task_epoch, result);
        });

        Ok(())
    }

    /// Begin disconnecting from a connected device.
    ///
    /// Fails with `NotConnected` unless the device is currently in the
    /// Connected phase, and with `UnknownDevice` for ids the session has
    /// never seen at all.
    pub fn disconnect(&self, id: &Id) -> Result<()> {
        let task_epoch;
        {
            let mut guard = self.inner.table.write().map_err(|_| {
                CoreError::runtime("Failed to acquire write lock on connection table")
            })?;
            let table = &mut *guard;

            match table.entries.get_mut(id) {
                Some(entry) => {
                    if entry.phase != ConnectionPhase::Connected {
                        return Err(Error::not_connected(id, entry.phase));
                    }
                    task_epoch = table.epoch;
                    entry.phase = ConnectionPhase::Disconnecting;
                }
                None => {
                    if self.registry.registry().contains(id)? {
                        return Err(Error::not_connected(id, ConnectionPhase::Disconnected));
                    }
                    return Err(Error::unknown_device(id));
                }
            }
        }

        info!("Disconnecting from {}", id);
        self.inner
            .publish_phase(id, ConnectionPhase::Connected, ConnectionPhase::Disconnecting);

        let inner = Arc::clone(&self.inner);
        let transport = Arc::clone(&self.transport);
        let timeout = self.config.get().connection.disconnect_timeout();
        let device = id.clone();
        tokio::spawn(async move {
            let result = match time::timeout(timeout, transport.disconnect_from(&device)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("acknowledgment timed out after {} ms", timeout.as_millis())),
            };
            inner.apply_disconnect_result(&device, task_epoch, result);
        });

        Ok(())
    }

    /// Get the connection state of a device.
    ///
    /// A registered device without a connection entry reports
    /// Disconnected; an id in neither table is `UnknownDevice`.
    pub fn status(&self, id: &Id) -> Result<ConnectionState> {
        {
            let table = self.inner.table.read().map_err(|_| {
                CoreError::runtime("Failed to acquire read lock on connection table")
            })?;

            if let Some(entry) = table.entries.get(id) {
                return Ok(ConnectionState {
                    device_id: id.clone(),
                    phase: entry.phase,
                    attempt_count: entry.attempt_count,
                    last_error: entry.last_error.clone(),
                });
            }
        }

        if self.registry.registry().contains(id)? {
            Ok(ConnectionState::disconnected(id.clone()))
        } else {
            Err(Error::unknown_device(id))
        }
    }

    /// Get the ids of all devices currently in the Connected phase
    pub fn list_active(&self) -> Result<Vec<Id>> {
        let table = self.inner.table.read().map_err(|_| {
            CoreError::runtime("Failed to acquire read lock on connection table")
        })?;

        Ok(table
            .entries
            .iter()
            .filter(|(_, e)| e.phase == ConnectionPhase::Connected)
            .map(|(id, _)| id.clone())
            .collect())
    }

    /// Get the connection states of every device the session has issued
    /// commands for
    pub fn states(&self) -> Result<Vec<ConnectionState>> {
        let table = self.inner.table.read().map_err(|_| {
            CoreError::runtime("Failed to acquire read lock on connection table")
        })?;

        Ok(table
            .entries
            .iter()
            .map(|(id, entry)| ConnectionState {
                device_id: id.clone(),
                phase: entry.phase,
                attempt_count: entry.attempt_count,
                last_error: entry.last_error.clone(),
            })
            .collect())
    }

    /// Count links that are established or in flight, mirroring the
    /// radio's occupied connection slots
    pub fn active_count(&self) -> Result<usize> {
        let table = self.inner.table.read().map_err(|_| {
            CoreError::runtime("Failed to acquire read lock on connection table")
        })?;

        Ok(table
            .entries
            .values()
            .filter(|e| e.phase.is_in_flight() || e.phase == ConnectionPhase::Connected)
            .count())
    }

    /// Forcibly reset every device to Disconnected and drop the
    /// connection table.
    ///
    /// Any in-flight transport result arriving after teardown carries a
    /// stale epoch and is discarded, never applied.
    pub fn teardown(&self) -> Result<()> {
        let events: Vec<ConnectionEvent>;
        {
            let mut table = self.inner.table.write().map_err(|_| {
                CoreError::runtime("Failed to acquire write lock on connection table")
            })?;

            table.epoch += 1;
            events = table
                .entries
                .iter()
                .filter(|(_, e)| e.phase != ConnectionPhase::Disconnected)
                .map(|(id, e)| ConnectionEvent::PhaseChanged {
                    device_id: id.clone(),
                    old_phase: e.phase,
                    new_phase: ConnectionPhase::Disconnected,
                })
                .collect();
            table.entries.clear();
        }

        for event in events {
            let _ = self.inner.event_sender.send(event);
        }
        info!("Connection manager torn down");
        Ok(())
    }

    /// Subscribe to connection events
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.event_sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::Notify;
    use tokio_test::assert_ok;

    use nodehub_core::config::Config;

    use crate::transport::{Advertisement, TransportError, TransportResult};

    /// Transport whose operations complete immediately.
    #[derive(Debug, Default)]
    struct ImmediateTransport;

    #[async_trait::async_trait]
    impl Transport for ImmediateTransport {
        async fn scan_for_devices(&self) -> TransportResult<Vec<Advertisement>> {
            Ok(Vec::new())
        }

        async fn connect_to(&self, _id: &Id) -> TransportResult<()> {
            Ok(())
        }

        async fn disconnect_from(&self, _id: &Id) -> TransportResult<()> {
            Ok(())
        }
    }

    /// Transport whose connects block until released.
    #[derive(Debug, Default)]
    struct GatedTransport {
        release: Notify,
    }

    #[async_trait::async_trait]
    impl Transport for GatedTransport {
        async fn scan_for_devices(&self) -> TransportResult<Vec<Advertisement>> {
            Ok(Vec::new())
        }

        async fn connect_to(&self, _id: &Id) -> TransportResult<()> {
            self.release.notified().await;
            Ok(())
        }

        async fn disconnect_from(&self, _id: &Id) -> TransportResult<()> {
            Ok(())
        }
    }

    /// Transport that fails the first connect and succeeds afterwards.
    #[derive(Debug, Default)]
    struct FlakyTransport {
        failed_once: AtomicBool,
    }

    #[async_trait::async_trait]
    impl Transport for FlakyTransport {
        async fn scan_for_devices(&self) -> TransportResult<Vec<Advertisement>> {
            Ok(Vec::new())
        }

        async fn connect_to(&self, _id: &Id) -> TransportResult<()> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                Err(TransportError::new("link establishment rejected"))
            } else {
                Ok(())
            }
        }

        async fn disconnect_from(&self, _id: &Id) -> TransportResult<()> {
            Ok(())
        }
    }

    fn manager_with(transport: Arc<dyn Transport>, config: Config) -> ConnectionManager {
        let registry = SharedDeviceRegistry::new();
        registry
            .registry()
            .upsert(&Advertisement::new("A1", -45).with_name("Sensor-1").with_battery(95))
            .unwrap();
        registry
            .registry()
            .upsert(&Advertisement::new("B2", -52).with_battery(87))
            .unwrap();
        ConnectionManager::new(registry, transport, SharedConfig::new(config))
    }

    async fn wait_for_phase(
        rx: &mut broadcast::Receiver<ConnectionEvent>,
        device: &Id,
        phase: ConnectionPhase,
    ) {
        loop {
            match rx.recv().await.unwrap() {
                ConnectionEvent::PhaseChanged {
                    device_id,
                    new_phase,
                    ..
                } if device_id == *device && new_phase == phase => return,
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_connect_unknown_device_creates_no_entry() {
        let manager = manager_with(Arc::new(ImmediateTransport), Config::default());
        let id: Id = "ZZ".into();

        let err = manager.connect(&id).unwrap_err();
        assert!(matches!(err, Error::UnknownDevice(_)));
        assert!(manager.states().unwrap().is_empty());
        assert!(matches!(manager.status(&id), Err(Error::UnknownDevice(_))));
    }

    #[tokio::test]
    async fn test_connect_success_reaches_connected() {
        let manager = manager_with(Arc::new(ImmediateTransport), Config::default());
        let id: Id = "A1".into();
        let mut rx = manager.subscribe();

        assert_ok!(manager.connect(&id));
        wait_for_phase(&mut rx, &id, ConnectionPhase::Connected).await;

        let state = manager.status(&id).unwrap();
        assert_eq!(state.phase, ConnectionPhase::Connected);
        assert_eq!(state.attempt_count, 0);
        assert_eq!(manager.list_active().unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_second_connect_before_resolution_is_rejected() {
        let manager = manager_with(Arc::new(GatedTransport::default()), Config::default());
        let id: Id = "A1".into();

        assert_ok!(manager.connect(&id));
        let err = manager.connect(&id).unwrap_err();
        assert!(matches!(
            err,
            Error::AlreadyInProgress {
                phase: ConnectionPhase::Connecting,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_connect_while_connected_is_noop() {
        let manager = manager_with(Arc::new(ImmediateTransport), Config::default());
        let id: Id = "A1".into();
        let mut rx = manager.subscribe();

        assert_ok!(manager.connect(&id));
        wait_for_phase(&mut rx, &id, ConnectionPhase::Connected).await;

        assert_ok!(manager.connect(&id));
        assert_eq!(manager.status(&id).unwrap().phase, ConnectionPhase::Connected);
        assert_eq!(manager.active_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_connect_disconnect_roundtrip_keeps_attempt_count() {
        let manager = manager_with(Arc::new(ImmediateTransport), Config::default());
        let id: Id = "A1".into();
        let mut rx = manager.subscribe();

        assert_ok!(manager.connect(&id));
        wait_for_phase(&mut rx, &id, ConnectionPhase::Connected).await;

        assert_ok!(manager.disconnect(&id));
        wait_for_phase(&mut rx, &id, ConnectionPhase::Disconnected).await;

        let state = manager.status(&id).unwrap();
        assert_eq!(state.phase, ConnectionPhase::Disconnected);
        assert_eq!(state.attempt_count, 0);
        assert!(manager.list_active().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_requires_connected_phase() {
        let manager = manager_with(Arc::new(ImmediateTransport), Config::default());
        let known: Id = "A1".into();
        let unknown: Id = "ZZ".into();

        let err = manager.disconnect(&known).unwrap_err();
        assert!(matches!(
            err,
            Error::NotConnected {
                phase: ConnectionPhase::Disconnected,
                ..
            }
        ));
        assert!(matches!(
            manager.disconnect(&unknown),
            Err(Error::UnknownDevice(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_attempt_increments_count_and_retry_recovers() {
        let manager = manager_with(Arc::new(FlakyTransport::default()), Config::default());
        let id: Id = "A1".into();
        let mut rx = manager.subscribe();

        assert_ok!(manager.connect(&id));
        wait_for_phase(&mut rx, &id, ConnectionPhase::Failed).await;

        let state = manager.status(&id).unwrap();
        assert_eq!(state.phase, ConnectionPhase::Failed);
        assert_eq!(state.attempt_count, 1);
        assert!(state.last_error.is_some());

        // Reissued connect passes through Connecting again
        assert_ok!(manager.connect(&id));
        wait_for_phase(&mut rx, &id, ConnectionPhase::Connecting).await;
        wait_for_phase(&mut rx, &id, ConnectionPhase::Connected).await;

        let state = manager.status(&id).unwrap();
        assert_eq!(state.phase, ConnectionPhase::Connected);
        assert_eq!(state.attempt_count, 0);
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_connect_failed_event_carries_attempts() {
        let manager = manager_with(Arc::new(FlakyTransport::default()), Config::default());
        let id: Id = "A1".into();
        let mut rx = manager.subscribe();

        assert_ok!(manager.connect(&id));
        loop {
            if let ConnectionEvent::ConnectFailed {
                device_id,
                attempts,
                message,
            } = rx.recv().await.unwrap()
            {
                assert_eq!(device_id, id);
                assert_eq!(attempts, 1);
                assert!(message.contains("rejected"));
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_attempt_timeout_marks_failed() {
        let mut config = Config::default();
        config.connection.connect_timeout_ms = 20;
        let manager = manager_with(Arc::new(GatedTransport::default()), config);
        let id: Id = "A1".into();
        let mut rx = manager.subscribe();

        assert_ok!(manager.connect(&id));
        wait_for_phase(&mut rx, &id, ConnectionPhase::Failed).await;

        let state = manager.status(&id).unwrap();
        assert_eq!(state.attempt_count, 1);
        assert!(state.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let mut config = Config::default();
        config.connection.max_connections = 1;
        let manager = manager_with(Arc::new(GatedTransport::default()), config);

        assert_ok!(manager.connect(&"A1".into()));
        let err = manager.connect(&"B2".into()).unwrap_err();
        assert!(matches!(err, Error::CapacityExhausted { limit: 1 }));
        assert_eq!(manager.active_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commands_for_different_devices_do_not_interfere() {
        let manager = manager_with(Arc::new(ImmediateTransport), Config::default());
        let a: Id = "A1".into();
        let b: Id = "B2".into();
        let mut rx = manager.subscribe();

        assert_ok!(manager.connect(&a));
        assert_ok!(manager.connect(&b));
        wait_for_phase(&mut rx, &a, ConnectionPhase::Connected).await;
        wait_for_phase(&mut rx, &b, ConnectionPhase::Connected).await;

        let mut active = manager.list_active().unwrap();
        active.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        assert_eq!(active, vec![a, b]);
    }

    #[tokio::test]
    async fn test_teardown_drops_late_transport_result() {
        let transport = Arc::new(GatedTransport::default());
        let manager = manager_with(transport.clone(), Config::default());
        let id: Id = "A1".into();

        assert_ok!(manager.connect(&id));
        assert_eq!(manager.status(&id).unwrap().phase, ConnectionPhase::Connecting);

        assert_ok!(manager.teardown());
        assert_eq!(manager.status(&id).unwrap().phase, ConnectionPhase::Disconnected);

        // Let the gated connect finish; its result carries a stale epoch
        transport.release.notify_one();
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        assert_eq!(manager.status(&id).unwrap().phase, ConnectionPhase::Disconnected);
        assert!(manager.states().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manager_usable_after_teardown() {
        let manager = manager_with(Arc::new(ImmediateTransport), Config::default());
        let id: Id = "A1".into();
        let mut rx = manager.subscribe();

        assert_ok!(manager.connect(&id));
        wait_for_phase(&mut rx, &id, ConnectionPhase::Connected).await;
        assert_ok!(manager.teardown());

        assert_ok!(manager.connect(&id));
        wait_for_phase(&mut rx, &id, ConnectionPhase::Connected).await;
        assert_eq!(manager.status(&id).unwrap().phase, ConnectionPhase::Connected);
    }
}
