//! Connection state machine and the registry of live connections.
//!
//! Each connection tracks which directions are still open. The server keeps
//! one registry entry per accepted socket so it can report what is still
//! alive when it shuts down.

use slab::Slab;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Both directions open.
    Open,
    /// The peer signaled end-of-stream; we may still write.
    ReadClosed,
    /// We signaled end-of-stream; the peer may still write.
    WriteClosed,
    /// Teardown requested, pending bytes are being flushed.
    Closing,
    /// Fully closed.
    Closed,
}

impl ConnState {
    /// State after the peer signals end-of-stream.
    pub fn on_remote_eof(self) -> Self {
        match self {
            ConnState::Open => ConnState::ReadClosed,
            ConnState::WriteClosed => ConnState::Closing,
            other => other,
        }
    }

    /// State after we signal end-of-stream.
    pub fn on_local_eof(self) -> Self {
        match self {
            ConnState::Open => ConnState::WriteClosed,
            ConnState::ReadClosed => ConnState::Closing,
            other => other,
        }
    }

    /// Whether the connection is half-closed in either direction.
    pub fn is_half_closed(self) -> bool {
        matches!(self, ConnState::ReadClosed | ConnState::WriteClosed)
    }

    /// Whether the read side can still deliver data.
    pub fn can_read(self) -> bool {
        matches!(self, ConnState::Open | ConnState::WriteClosed)
    }

    /// Whether the write side can still send data.
    pub fn can_write(self) -> bool {
        matches!(self, ConnState::Open | ConnState::ReadClosed)
    }
}

/// A single live connection as seen by the registry.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Remote address identifying the connection.
    pub peer: SocketAddr,
    /// Current connection state.
    pub state: ConnState,
}

impl Connection {
    /// Create a new connection in the open state.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            state: ConnState::Open,
        }
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
pub struct ConnectionRegistry {
    connections: Slab<Connection>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection) -> Option<usize> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    /// Get an immutable reference to a connection.
    pub fn get(&self, id: usize) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Update the recorded state of a connection.
    pub fn set_state(&mut self, id: usize, state: ConnState) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.state = state;
        }
    }

    /// Remove a connection from the registry.
    pub fn remove(&mut self, id: usize) -> Option<Connection> {
        self.connections.try_remove(id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if there are no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate over all connections.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Connection)> {
        self.connections.iter()
    }
}

/// Registry shared between the accept loop and connection tasks.
pub type SharedRegistry = Arc<Mutex<ConnectionRegistry>>;

/// A registry slot owned by one connection.
///
/// Keeps the registry entry in step with the transport state and frees the
/// slot when dropped.
#[derive(Debug)]
pub struct Tracked {
    registry: SharedRegistry,
    id: usize,
}

impl Tracked {
    /// Register `peer` in `registry`. Returns `None` at capacity.
    pub fn register(registry: &SharedRegistry, peer: SocketAddr) -> Option<Self> {
        let id = registry.lock().ok()?.insert(Connection::new(peer))?;
        Some(Self {
            registry: Arc::clone(registry),
            id,
        })
    }

    /// Slot id in the registry.
    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn update(&self, state: ConnState) {
        if let Ok(mut registry) = self.registry.lock() {
            if let Some(conn) = registry.get(self.id) {
                trace!(id = self.id, from = ?conn.state, to = ?state, "connection state");
            }
            registry.set_state(self.id, state);
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.connections.len())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_connection_state_transitions() {
        let state = ConnState::Open;

        let state = state.on_local_eof();
        assert_eq!(state, ConnState::WriteClosed);
        assert!(state.is_half_closed());
        assert!(state.can_read());

        let state = state.on_remote_eof();
        assert_eq!(state, ConnState::Closing);
        assert!(!state.can_read());

        assert_eq!(ConnState::Open.on_remote_eof(), ConnState::ReadClosed);
        assert_eq!(ConnState::ReadClosed.on_local_eof(), ConnState::Closing);
        assert_eq!(ConnState::Closed.on_remote_eof(), ConnState::Closed);
    }

    #[test]
    fn test_connection_registry() {
        let mut registry = ConnectionRegistry::new(2);

        let id1 = registry.insert(Connection::new(addr(10))).unwrap();
        let id2 = registry.insert(Connection::new(addr(11))).unwrap();

        // At capacity
        assert!(registry.insert(Connection::new(addr(12))).is_none());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(id1).unwrap().peer, addr(10));

        registry.set_state(id2, ConnState::ReadClosed);
        assert_eq!(registry.get(id2).unwrap().state, ConnState::ReadClosed);

        registry.remove(id1);
        assert!(registry.get(id1).is_none());
        assert!(registry.remove(id1).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_tracked_slot_released_on_drop() {
        let registry: SharedRegistry = Arc::new(Mutex::new(ConnectionRegistry::new(1)));

        let tracked = Tracked::register(&registry, addr(20)).unwrap();
        assert!(Tracked::register(&registry, addr(21)).is_none());

        tracked.update(ConnState::WriteClosed);
        assert_eq!(
            registry.lock().unwrap().get(tracked.id()).unwrap().state,
            ConnState::WriteClosed
        );

        drop(tracked);
        assert!(registry.lock().unwrap().is_empty());
        assert!(Tracked::register(&registry, addr(21)).is_some());
    }
}
