use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::connection::{Connection, ConnectionId, ConnectionParams, PortSettings};
use crate::error::SessionError;
use crate::options::{BaudRate, DisplayMode};

const DEFAULT_MAX_BYTES: usize = 10_000;

/// Values given to every newly added connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionDefaults {
    pub max_bytes: usize,
    pub display_mode: DisplayMode,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            display_mode: DisplayMode::Ascii,
        }
    }
}

/// Change notifications for observers of the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(ConnectionId),
    Removed(ConnectionId),
    Updated(ConnectionId),
}

struct ManagedConnection {
    seq: u64,
    connection: Connection,
}

struct Inner {
    connections: RwLock<HashMap<ConnectionId, ManagedConnection>>,
    next_seq: AtomicU64,
    defaults: ConnectionDefaults,
    event_tx: broadcast::Sender<RegistryEvent>,
}

/// Authoritative collection of connection records.
///
/// Cloning the registry yields another handle to the same store. Every
/// operation takes the lock once, so a reader never sees a half-applied
/// update.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_defaults(ConnectionDefaults::default())
    }

    pub fn with_defaults(defaults: ConnectionDefaults) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                connections: RwLock::new(HashMap::new()),
                next_seq: AtomicU64::new(1),
                defaults,
                event_tx,
            }),
        }
    }

    pub fn defaults(&self) -> ConnectionDefaults {
        self.inner.defaults
    }

    /// Register a new port and return its freshly generated id
    pub async fn add_port(&self, params: ConnectionParams) -> Result<ConnectionId, SessionError> {
        let baud_rate = BaudRate::try_from(params.baud_rate)?;
        let defaults = self.inner.defaults;
        if defaults.max_bytes == 0 {
            return Err(SessionError::InvalidBufferSize);
        }

        let mut connections = self.inner.connections.write().await;
        let id = loop {
            let candidate = ConnectionId::new();
            if !connections.contains_key(&candidate) {
                break candidate;
            }
        };

        debug!("Adding port {} ({} baud) as {}", params.name, baud_rate, id);

        let connection = Connection::new(
            id,
            params.name,
            baud_rate,
            defaults.max_bytes,
            defaults.display_mode,
        );
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        connections.insert(id, ManagedConnection { seq, connection });
        drop(connections);

        self.notify(RegistryEvent::Added(id));
        Ok(id)
    }

    /// Remove a port. Removing an absent id is not an error.
    pub async fn remove_port(&self, id: ConnectionId) -> bool {
        let removed = self.inner.connections.write().await.remove(&id).is_some();
        if removed {
            debug!("Removed port {}", id);
            self.notify(RegistryEvent::Removed(id));
        }
        removed
    }

    /// Snapshot of one connection
    pub async fn get(&self, id: ConnectionId) -> Result<Connection, SessionError> {
        self.inner
            .connections
            .read()
            .await
            .get(&id)
            .map(|managed| managed.connection.clone())
            .ok_or(SessionError::NotFound(id))
    }

    /// Snapshot of every connection, oldest first
    pub async fn list(&self) -> Vec<Connection> {
        let connections = self.inner.connections.read().await;
        let mut managed: Vec<&ManagedConnection> = connections.values().collect();
        managed.sort_by_key(|m| m.seq);
        managed.into_iter().map(|m| m.connection.clone()).collect()
    }

    pub async fn exists(&self, id: ConnectionId) -> bool {
        self.inner.connections.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.connections.read().await.is_empty()
    }

    /// Mark the backend port open or closed. Clears the receive buffer.
    pub async fn set_is_active(&self, id: ConnectionId, active: bool) -> Result<(), SessionError> {
        self.update(id, |c| {
            c.is_active = active;
            c.clear_received();
        })
        .await
    }

    /// Enable or pause streaming. Clears the receive buffer.
    pub async fn set_is_running(
        &self,
        id: ConnectionId,
        running: bool,
    ) -> Result<(), SessionError> {
        self.update(id, |c| {
            c.is_running = running;
            c.clear_received();
        })
        .await
    }

    pub async fn set_display_mode(
        &self,
        id: ConnectionId,
        mode: DisplayMode,
    ) -> Result<(), SessionError> {
        self.update(id, |c| c.display_mode = mode).await
    }

    /// Change the receive buffer cap. Shrinking drops the oldest data.
    pub async fn set_display_size(
        &self,
        id: ConnectionId,
        max_bytes: usize,
    ) -> Result<(), SessionError> {
        if max_bytes == 0 {
            return Err(SessionError::InvalidBufferSize);
        }
        self.update(id, |c| c.set_max_bytes(max_bytes)).await
    }

    pub async fn set_log_enabled(&self, id: ConnectionId, enabled: bool) -> Result<(), SessionError> {
        self.update(id, |c| c.is_logging = enabled).await
    }

    pub async fn set_log_file(
        &self,
        id: ConnectionId,
        path: impl Into<String>,
    ) -> Result<(), SessionError> {
        let path = path.into();
        self.update(id, |c| c.log_path = path).await
    }

    /// Replace the line settings used the next time the port is opened
    pub async fn set_port_settings(
        &self,
        id: ConnectionId,
        settings: PortSettings,
    ) -> Result<(), SessionError> {
        self.update(id, |c| c.apply_port_settings(settings)).await
    }

    /// Append incoming data, keeping only the newest `max_bytes` characters.
    /// Data for an inactive connection is dropped.
    pub async fn append_received(&self, id: ConnectionId, chunk: &str) -> Result<(), SessionError> {
        self.update(id, |c| {
            if c.is_active {
                c.append_received(chunk);
            } else {
                debug!("Dropping {} received bytes for inactive {}", chunk.len(), id);
            }
        })
        .await
    }

    /// Overwrite the receive buffer. Ignored while the connection is inactive.
    pub async fn replace_received(
        &self,
        id: ConnectionId,
        buffer: &str,
    ) -> Result<(), SessionError> {
        self.update(id, |c| {
            if c.is_active {
                c.replace_received(buffer);
            } else {
                debug!("Dropping snapshot for inactive {}", id);
            }
        })
        .await
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.event_tx.subscribe()
    }

    async fn update<F>(&self, id: ConnectionId, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut Connection),
    {
        {
            let mut connections = self.inner.connections.write().await;
            let managed = connections.get_mut(&id).ok_or(SessionError::NotFound(id))?;
            f(&mut managed.connection);
        }
        self.notify(RegistryEvent::Updated(id));
        Ok(())
    }

    fn notify(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.inner.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn com1() -> ConnectionParams {
        ConnectionParams {
            name: "COM1".to_string(),
            baud_rate: 9600,
        }
    }

    #[tokio::test]
    async fn add_port_applies_defaults() {
        let registry = ConnectionRegistry::new();
        let id = registry.add_port(com1()).await.unwrap();

        let all = registry.list().await;
        assert_eq!(all.len(), 1);
        let c = &all[0];
        assert_eq!(c.id, id);
        assert_eq!(c.baud_rate.value(), 9600);
        assert!(!c.is_active);
        assert!(!c.is_running);
        assert!(!c.is_logging);
        assert_eq!(c.max_bytes, 10000);
        assert_eq!(c.display_mode, DisplayMode::Ascii);
        assert_eq!(c.rx_buffer(), "");
    }

    #[tokio::test]
    async fn add_port_rejects_unknown_baud() {
        let registry = ConnectionRegistry::new();
        let err = registry
            .add_port(ConnectionParams {
                name: "COM1".to_string(),
                baud_rate: 9601,
            })
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::InvalidBaudRate(9601));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let registry = ConnectionRegistry::new();
        let a = registry.add_port(com1()).await.unwrap();
        let b = registry.add_port(com1()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn list_is_in_creation_order() {
        let registry = ConnectionRegistry::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(registry.add_port(com1()).await.unwrap());
        }
        let listed: Vec<ConnectionId> = registry.list().await.iter().map(|c| c.id).collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let keep = registry.add_port(com1()).await.unwrap();
        let id = registry.add_port(com1()).await.unwrap();

        assert!(registry.remove_port(id).await);
        assert!(!registry.remove_port(id).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.exists(keep).await);
    }

    #[tokio::test]
    async fn activity_changes_clear_buffer() {
        let registry = ConnectionRegistry::new();
        let id = registry.add_port(com1()).await.unwrap();

        registry.set_is_active(id, true).await.unwrap();
        registry.append_received(id, "stale").await.unwrap();
        registry.set_is_running(id, false).await.unwrap();
        let c = registry.get(id).await.unwrap();
        assert!(c.is_active);
        assert_eq!(c.rx_buffer(), "");

        registry.append_received(id, "stale").await.unwrap();
        registry.set_is_active(id, true).await.unwrap();
        assert_eq!(registry.get(id).await.unwrap().rx_buffer(), "");

        registry.append_received(id, "stale").await.unwrap();
        registry.set_is_active(id, false).await.unwrap();
        assert_eq!(registry.get(id).await.unwrap().rx_buffer(), "");
    }

    #[tokio::test]
    async fn data_for_inactive_connection_is_dropped() {
        let registry = ConnectionRegistry::new();
        let id = registry.add_port(com1()).await.unwrap();

        registry.append_received(id, "early").await.unwrap();
        registry.replace_received(id, "snapshot").await.unwrap();
        assert_eq!(registry.get(id).await.unwrap().rx_buffer(), "");

        registry.set_is_active(id, true).await.unwrap();
        registry.append_received(id, "live").await.unwrap();
        registry.set_is_active(id, false).await.unwrap();
        registry.append_received(id, "late").await.unwrap();
        registry.replace_received(id, "late snapshot").await.unwrap();

        let c = registry.get(id).await.unwrap();
        assert!(!c.is_active);
        assert_eq!(c.rx_buffer(), "");
    }

    #[tokio::test]
    async fn field_setters_leave_other_fields_alone() {
        let registry = ConnectionRegistry::new();
        let id = registry.add_port(com1()).await.unwrap();
        registry.set_is_active(id, true).await.unwrap();
        registry.append_received(id, "data").await.unwrap();

        registry.set_display_mode(id, DisplayMode::Hex).await.unwrap();
        registry.set_log_enabled(id, true).await.unwrap();
        registry.set_log_file(id, "/tmp/rx.log").await.unwrap();

        let c = registry.get(id).await.unwrap();
        assert_eq!(c.display_mode, DisplayMode::Hex);
        assert!(c.is_logging);
        assert_eq!(c.log_path, "/tmp/rx.log");
        assert_eq!(c.rx_buffer(), "data");
        assert!(c.is_active);
        assert!(!c.is_running);
    }

    #[tokio::test]
    async fn append_drops_oldest_beyond_cap() {
        let registry = ConnectionRegistry::new();
        let id = registry.add_port(com1()).await.unwrap();
        registry.set_display_size(id, 5).await.unwrap();
        registry.set_is_active(id, true).await.unwrap();

        registry.append_received(id, "abc").await.unwrap();
        registry.append_received(id, "defgh").await.unwrap();
        assert_eq!(registry.get(id).await.unwrap().rx_buffer(), "defgh");
    }

    #[tokio::test]
    async fn display_size_must_be_positive() {
        let registry = ConnectionRegistry::new();
        let id = registry.add_port(com1()).await.unwrap();
        assert_eq!(
            registry.set_display_size(id, 0).await,
            Err(SessionError::InvalidBufferSize)
        );
        assert_eq!(registry.get(id).await.unwrap().max_bytes, 10000);
    }

    #[tokio::test]
    async fn mutation_on_missing_id_is_reported() {
        let registry = ConnectionRegistry::new();
        let ghost = ConnectionId::new();
        assert_eq!(
            registry.set_is_active(ghost, true).await,
            Err(SessionError::NotFound(ghost))
        );
        assert_eq!(
            registry.append_received(ghost, "x").await,
            Err(SessionError::NotFound(ghost))
        );
        assert!(registry.get(ghost).await.is_err());
    }

    #[tokio::test]
    async fn port_settings_update() {
        let registry = ConnectionRegistry::new();
        let id = registry.add_port(com1()).await.unwrap();
        let mut settings = registry.get(id).await.unwrap().port_settings();
        settings.name = "COM7".to_string();
        settings.baud_rate = BaudRate::try_from(115200).unwrap();
        settings.parity = crate::options::Parity::Even;
        registry.set_port_settings(id, settings.clone()).await.unwrap();

        assert_eq!(registry.get(id).await.unwrap().port_settings(), settings);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let registry = ConnectionRegistry::new();
        let mut rx = registry.subscribe();

        let id = registry.add_port(com1()).await.unwrap();
        registry.set_is_active(id, true).await.unwrap();
        registry.remove_port(id).await;
        registry.remove_port(id).await;

        assert_eq!(rx.recv().await.unwrap(), RegistryEvent::Added(id));
        assert_eq!(rx.recv().await.unwrap(), RegistryEvent::Updated(id));
        assert_eq!(rx.recv().await.unwrap(), RegistryEvent::Removed(id));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn custom_defaults() {
        let registry = ConnectionRegistry::with_defaults(ConnectionDefaults {
            max_bytes: 64,
            display_mode: DisplayMode::Decimal,
        });
        let id = registry.add_port(com1()).await.unwrap();
        let c = registry.get(id).await.unwrap();
        assert_eq!(c.max_bytes, 64);
        assert_eq!(c.display_mode, DisplayMode::Decimal);
    }
}
