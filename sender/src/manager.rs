//! High-level sender surface: creates connections, delegates routing to the
//! registry.
//!
//! A [`Manager`] is an explicitly constructed instance handed by reference
//! (or clone; it is a thin handle over a shared registry) to every caller
//! that needs it. A process-wide default, if an application wants one, is a
//! convenience the application builds once at startup, not something baked
//! in here.

use std::sync::Arc;

use log::*;
use tokio::io::DuplexStream;
use wire::Record;

use crate::connection::{Connection, ConnectionId, ConnectionOptions};
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct Manager {
    registry: Arc<ConnectionRegistry>,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Create a connection and register it. Returns the connection and the
    /// read end of its pipe for the routing layer to stream.
    pub fn create_client(&self, options: ConnectionOptions) -> (Arc<Connection>, DuplexStream) {
        let (connection, reader) = Connection::new(options);
        self.registry.add(Arc::clone(&connection));
        info!("registered connection {}", connection.id());
        (connection, reader)
    }

    /// Register an externally constructed connection.
    pub fn add_connection(&self, connection: Arc<Connection>) {
        info!("registered connection {}", connection.id());
        self.registry.add(connection);
    }

    /// Deregister and close a connection.
    pub async fn remove_connection(&self, id: &ConnectionId) {
        info!("unregistering connection {id}");
        self.registry.remove(id).await;
    }

    pub async fn send_to_client(&self, id: &ConnectionId, record: &Record) {
        self.registry.send_to_client(id, record).await;
    }

    pub async fn send_to_user(&self, user_id: &str, record: &Record) {
        self.registry.send_to_user(user_id, record).await;
    }

    pub async fn broadcast(&self, record: &Record) {
        self.registry.broadcast(record).await;
    }

    pub fn clients_count(&self) -> usize {
        self.registry.clients_count()
    }

    pub fn users_count(&self) -> usize {
        self.registry.users_count()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
