//! Connection registry with dual indices for O(1) lookups.
//!
//! Primary index: connection id → connection, for registration and cleanup.
//! Secondary index: user id → set of connection ids, for user-scoped
//! routing. Both live inside one lock so every mutation of the pair is
//! atomic with respect to fan-out readers: a reader observes either the
//! pre- or the post-mutation state, never half of each.
//!
//! Fan-out snapshots its targets under the read lock, releases it, then
//! issues all writes concurrently and waits for all of them; one target's
//! failure never blocks or fails the others. A target that comes out of a
//! send closed is deregistered before the call returns.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::join_all;
use log::*;
use wire::Record;

use crate::connection::{Connection, ConnectionId};

#[derive(Default)]
struct Indexes {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    users: HashMap<String, HashSet<ConnectionId>>,
}

fn remove_entry(indexes: &mut Indexes, id: &ConnectionId) -> Option<Arc<Connection>> {
    let connection = indexes.connections.remove(id)?;
    if let Some(user_id) = connection.user_id() {
        if let Some(ids) = indexes.users.get_mut(user_id) {
            ids.remove(id);
            if ids.is_empty() {
                indexes.users.remove(user_id);
            }
        }
    }
    Some(connection)
}

pub struct ConnectionRegistry {
    indexes: RwLock<Indexes>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(Indexes::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        self.indexes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes> {
        self.indexes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection under both indices.
    pub fn add(&self, connection: Arc<Connection>) {
        let id = connection.id().clone();
        let user_id = connection.user_id().map(str::to_string);
        let mut indexes = self.write();
        if let Some(user_id) = user_id {
            indexes.users.entry(user_id).or_default().insert(id.clone());
        }
        indexes.connections.insert(id, connection);
    }

    /// Deregister a connection. Index mutation completes first; only then
    /// is the connection's close awaited.
    pub async fn remove(&self, id: &ConnectionId) {
        let removed = remove_entry(&mut self.write(), id);
        match removed {
            Some(connection) => {
                debug!("removed connection {id}");
                connection.close().await;
            }
            None => debug!("remove for unknown connection {id}"),
        }
    }

    /// Forward a record to one connection. Unknown ids warn and no-op.
    pub async fn send_to_client(&self, id: &ConnectionId, record: &Record) {
        let target = self.read().connections.get(id).cloned();
        let Some(connection) = target else {
            warn!("send_to_client: unknown connection {id}");
            return;
        };
        connection.send(record).await;
        self.reap(&[connection]);
    }

    /// Fan a record out to every connection of a user. A user with no
    /// connections warns and no-ops.
    pub async fn send_to_user(&self, user_id: &str, record: &Record) {
        let targets: Vec<Arc<Connection>> = {
            let indexes = self.read();
            indexes
                .users
                .get(user_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| indexes.connections.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };
        if targets.is_empty() {
            warn!("send_to_user: no connections for user {user_id}");
            return;
        }
        join_all(targets.iter().map(|connection| connection.send(record))).await;
        self.reap(&targets);
    }

    /// Fan a record out to every registered connection.
    pub async fn broadcast(&self, record: &Record) {
        let targets: Vec<Arc<Connection>> =
            self.read().connections.values().cloned().collect();
        join_all(targets.iter().map(|connection| connection.send(record))).await;
        self.reap(&targets);
    }

    pub fn clients_count(&self) -> usize {
        self.read().connections.len()
    }

    pub fn users_count(&self) -> usize {
        self.read().users.len()
    }

    /// Drop index entries for targets that came out of a send closed.
    fn reap(&self, targets: &[Arc<Connection>]) {
        if !targets.iter().any(|connection| connection.is_closed()) {
            return;
        }
        let mut indexes = self.write();
        for connection in targets.iter().filter(|connection| connection.is_closed()) {
            if remove_entry(&mut indexes, connection.id()).is_some() {
                debug!("reaped closed connection {}", connection.id());
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionOptions;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use wire::FrameParser;

    fn user_connection(
        registry: &ConnectionRegistry,
        user_id: Option<&str>,
    ) -> (Arc<Connection>, DuplexStream) {
        let (connection, reader) = Connection::new(ConnectionOptions {
            user_id: user_id.map(str::to_string),
            ..ConnectionOptions::default()
        });
        registry.add(connection.clone());
        (connection, reader)
    }

    async fn read_frames(reader: &mut DuplexStream) -> Vec<wire::Frame> {
        let mut buffer = vec![0u8; 4096];
        let read = reader.read(&mut buffer).await.unwrap();
        FrameParser::new().feed(&buffer[..read])
    }

    #[tokio::test]
    async fn counts_track_both_indices() {
        let registry = ConnectionRegistry::new();
        let (first, _r1) = user_connection(&registry, Some("u1"));
        let (_second, _r2) = user_connection(&registry, Some("u1"));
        let (_third, _r3) = user_connection(&registry, None);
        assert_eq!(registry.clients_count(), 3);
        assert_eq!(registry.users_count(), 1);

        registry.remove(first.id()).await;
        assert_eq!(registry.clients_count(), 2);
        assert_eq!(registry.users_count(), 1);
    }

    #[tokio::test]
    async fn users_count_drops_exactly_when_last_connection_goes() {
        let registry = ConnectionRegistry::new();
        let (first, _r1) = user_connection(&registry, Some("u1"));
        let (second, _r2) = user_connection(&registry, Some("u1"));
        registry.remove(first.id()).await;
        assert_eq!(registry.users_count(), 1);
        registry.remove(second.id()).await;
        assert_eq!(registry.users_count(), 0);
    }

    #[tokio::test]
    async fn removed_connection_is_closed_and_sends_become_no_ops() {
        let registry = ConnectionRegistry::new();
        let (connection, _reader) = user_connection(&registry, Some("u1"));
        let id = connection.id().clone();
        registry.remove(&id).await;
        assert!(connection.is_closed());

        // Unknown targets are a warned no-op, not an error.
        registry.send_to_client(&id, &Record::new("x")).await;
        registry.send_to_user("u1", &Record::new("x")).await;
        registry.remove(&id).await;
    }

    #[tokio::test]
    async fn send_to_user_reaches_every_connection_of_that_user() {
        let registry = ConnectionRegistry::new();
        let (_first, mut r1) = user_connection(&registry, Some("u1"));
        let (_second, mut r2) = user_connection(&registry, Some("u1"));
        let (_other, _r3) = user_connection(&registry, Some("u2"));

        registry
            .send_to_user("u1", &Record::new(json!({"n": 1})).with_event("tick"))
            .await;
        for reader in [&mut r1, &mut r2] {
            let frames = read_frames(reader).await;
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].event.as_deref(), Some("tick"));
        }
    }

    #[tokio::test]
    async fn broadcast_survives_one_dead_connection() {
        let registry = ConnectionRegistry::new();
        let (_first, mut r1) = user_connection(&registry, Some("u1"));
        let (dead, r2) = user_connection(&registry, Some("u2"));
        let (_third, mut r3) = user_connection(&registry, None);
        drop(r2);

        registry.broadcast(&Record::new("news")).await;

        // The two live connections got the frame ...
        for reader in [&mut r1, &mut r3] {
            let frames = read_frames(reader).await;
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].data, "news");
        }
        // ... and the dead one was closed and deregistered.
        assert!(dead.is_closed());
        assert_eq!(registry.clients_count(), 2);
        assert_eq!(registry.users_count(), 1);
    }

    #[tokio::test]
    async fn send_to_client_targets_only_that_connection() {
        let registry = ConnectionRegistry::new();
        let (first, mut r1) = user_connection(&registry, None);
        let (_second, mut r2) = user_connection(&registry, None);
        registry.send_to_client(first.id(), &Record::new("direct")).await;

        let frames = read_frames(&mut r1).await;
        assert_eq!(frames[0].data, "direct");

        // The other connection saw nothing.
        registry.broadcast(&Record::new("flush")).await;
        let frames = read_frames(&mut r2).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "flush");
    }
}
