//! Live connection set shared by every session.

use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::map::Entry;
use parking_lot::RwLock;

use super::connection::{ClientConnection, ConnectionId};

/// Insertion-ordered set of open connections.
///
/// The lock is only held to mutate the map or copy a snapshot out of it,
/// never while sending.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<IndexMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns `false` if its id is already present.
    pub fn add(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.write();
        match conns.entry(connection.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let _ = slot.insert(connection);
                true
            }
        }
    }

    /// Unregister a connection. Removing an absent id is a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.write().shift_remove(id)
    }

    /// Copy of the current members, in arrival order.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Visit each member of a snapshot.
    pub fn for_each(&self, mut visit: impl FnMut(&Arc<ClientConnection>)) {
        for conn in &self.snapshot() {
            visit(conn);
        }
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
