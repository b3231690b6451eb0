/*!
 * Hub session.
 *
 * One run of the test hub, from start to teardown. The session owns the
 * device registry and the connection manager and is the single object a
 * presentation layer talks to; it is constructed per run (or per test)
 * and passed by reference, with no process-wide state.
 */
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, info, Instrument};

use nodehub_core::config::{Config, SharedConfig};
use nodehub_core::logging::component_span;
use nodehub_core::types::Id;

use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionPhase, ConnectionState};
use crate::device::DeviceRecord;
use crate::error::{Error, Result};
use crate::registry::{RegistryEvent, SharedDeviceRegistry};
use crate::transport::Transport;

/// A hub session owning the registry and the connection manager
#[derive(Debug)]
pub struct HubSession {
    /// Session identifier, for log correlation
    id: Id,
    registry: SharedDeviceRegistry,
    connections: ConnectionManager,
    transport: Arc<dyn Transport>,
    config: SharedConfig,
}

impl HubSession {
    /// Create a session with default configuration
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, SharedConfig::new(Config::default()))
    }

    /// Create a session with a specific configuration
    pub fn with_config(transport: Arc<dyn Transport>, config: SharedConfig) -> Self {
        let registry = SharedDeviceRegistry::new();
        let connections =
            ConnectionManager::new(registry.clone(), Arc::clone(&transport), config.clone());
        let id = Id::new();
        info!("Session {} started", id);
        Self {
            id,
            registry,
            connections,
            transport,
            config,
        }
    }

    /// Get the session identifier
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Get the session configuration
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Get the device registry, for read-only presentation queries
    pub fn registry(&self) -> &SharedDeviceRegistry {
        &self.registry
    }

    /// Get the connection manager, for read-only presentation queries
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Run one scan sweep and merge every observed advertisement into
    /// the registry.
    ///
    /// Returns the merged records, newly discovered and rediscovered
    /// alike, in the order the transport reported them. The sweep is
    /// bounded by the configured scan timeout.
    pub async fn scan(&self) -> Result<Vec<DeviceRecord>> {
        let span = component_span("session", Some(self.id.as_str()));
        async {
            info!("Scanning for nodes");
            let timeout = self.config.get().scan.timeout();
            let advertisements =
                match time::timeout(timeout, self.transport.scan_for_devices()).await {
                    Ok(Ok(advertisements)) => advertisements,
                    Ok(Err(e)) => return Err(Error::transport(e.to_string(), 0)),
                    Err(_) => {
                        return Err(Error::transport(
                            format!("scan timed out after {} ms", timeout.as_millis()),
                            0,
                        ))
                    }
                };

            let mut records = Vec::with_capacity(advertisements.len());
            for adv in &advertisements {
                let newly = self.registry.registry().upsert(adv)?;
                let record = self.registry.registry().get(&adv.id)?;
                if newly {
                    info!(
                        "Found node {} ({} dBm)",
                        record.display_name, record.signal_strength
                    );
                } else {
                    debug!("Node {} seen again", record.display_name);
                }
                records.push(record);
            }
            Ok(records)
        }
        .instrument(span)
        .await
    }

    /// List every device known to this session, in discovery order
    pub fn devices(&self) -> Result<Vec<DeviceRecord>> {
        self.registry.registry().list()
    }

    /// Begin connecting to a device; see [`ConnectionManager::connect`]
    pub fn connect(&self, id: &Id) -> Result<()> {
        self.connections.connect(id)
    }

    /// Begin disconnecting from a device; see
    /// [`ConnectionManager::disconnect`]
    pub fn disconnect(&self, id: &Id) -> Result<()> {
        self.connections.disconnect(id)
    }

    /// Get the connection state of a device
    pub fn status(&self, id: &Id) -> Result<ConnectionState> {
        self.connections.status(id)
    }

    /// Get the ids of all currently connected devices
    pub fn list_active(&self) -> Result<Vec<Id>> {
        self.connections.list_active()
    }

    /// Issue a connect for every registered device and wait for each
    /// attempt to settle.
    ///
    /// Per device the result is `Ok` once Connected, the command error
    /// if the connect could not be issued, or the transport failure of
    /// the attempt. Devices already connected report `Ok` immediately;
    /// attempts canceled by a concurrent teardown report a transport
    /// failure.
    pub async fn connect_all(&self) -> Result<Vec<(Id, Result<()>)>> {
        let ids = self.registry.registry().ids()?;
        info!("Auto-connecting to {} node(s)", ids.len());

        let mut results = Vec::with_capacity(ids.len());
        let mut pending = Vec::new();
        for id in ids {
            if self.connections.status(&id)?.phase == ConnectionPhase::Connected {
                results.push((id, Ok(())));
                continue;
            }
            // Subscribe before issuing so the terminal event cannot be missed
            let rx = self.connections.subscribe();
            match self.connections.connect(&id) {
                Ok(()) => pending.push((id, rx)),
                Err(e) => results.push((id, Err(e))),
            }
        }

        let connections = &self.connections;
        let settled = join_all(pending.into_iter().map(|(id, rx)| async move {
            let result = Self::await_settled(connections, &id, rx).await;
            (id, result)
        }))
        .await;

        results.extend(settled);
        Ok(results)
    }

    async fn await_settled(
        connections: &ConnectionManager,
        id: &Id,
        mut rx: broadcast::Receiver<ConnectionEvent>,
    ) -> Result<()> {
        loop {
            match rx.recv().await {
                Ok(ConnectionEvent::PhaseChanged {
                    device_id,
                    new_phase,
                    ..
                }) if device_id == *id => match new_phase {
                    ConnectionPhase::Connected => return Ok(()),
                    ConnectionPhase::Failed => {
                        let state = connections.status(id)?;
                        return Err(Error::transport(
                            state
                                .last_error
                                .unwrap_or_else(|| "connection attempt failed".to_string()),
                            state.attempt_count,
                        ));
                    }
                    ConnectionPhase::Disconnected => {
                        return Err(Error::transport("attempt canceled by teardown", 0))
                    }
                    _ => {}
                },
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Fall back to polling the state we may have missed
                    let state = connections.status(id)?;
                    match state.phase {
                        ConnectionPhase::Connected => return Ok(()),
                        ConnectionPhase::Failed => {
                            return Err(Error::transport(
                                state
                                    .last_error
                                    .unwrap_or_else(|| "connection attempt failed".to_string()),
                                state.attempt_count,
                            ))
                        }
                        _ => {}
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::transport("connection event channel closed", 0))
                }
            }
        }
    }

    /// Subscribe to registry events
    pub fn subscribe_registry(&self) -> broadcast::Receiver<RegistryEvent> {
        self.registry.registry().subscribe()
    }

    /// Subscribe to connection events
    pub fn subscribe_connections(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connections.subscribe()
    }

    /// Tear the session down: cancel pending transitions, reset every
    /// device to Disconnected, and empty the registry.
    ///
    /// The session object itself remains usable; the next scan starts a
    /// fresh view of the field.
    pub fn teardown(&self) -> Result<()> {
        self.connections.teardown()?;
        self.registry.registry().clear()?;
        info!("Session {} torn down", self.id);
        Ok(())
    }
}
