//! Live connection tracking for the socket transport.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{Connection, ConnectionId};

/// Set of open connections keyed by id, used to force-close them on shutdown.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a connection with the same id is already tracked.
    pub fn add(&self, connection: Arc<dyn Connection>) -> bool {
        let mut connections = self.lock();
        if connections.contains_key(&connection.id()) {
            return false;
        }
        connections.insert(connection.id(), connection);
        true
    }

    pub fn remove(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Closes every tracked connection and empties the registry. Returns how
    /// many connections were closed.
    pub fn close_all(&self) -> usize {
        let drained = self.lock().drain().map(|(_, connection)| connection).collect::<Vec<_>>();
        for connection in &drained {
            connection.close();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<dyn Connection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
