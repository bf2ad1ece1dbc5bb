//! One outbound client connection.
//!
//! A [`Connection`] owns the write end of a duplex byte pipe; the read end
//! is handed to the routing layer at construction and becomes the response
//! body. The connection serializes records into wire frames, runs its own
//! heartbeat timer, and closes itself on the first write failure.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::*;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use wire::Record;

/// Default keep-alive cadence.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(15_000);

/// Unique identifier for a connection (server-generated).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// The user this connection belongs to, if authenticated.
    pub user_id: Option<String>,
    /// Capacity of the duplex pipe between connection and routing layer.
    pub pipe_capacity: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            user_id: None,
            pipe_capacity: 64 * 1024,
        }
    }
}

pub struct Connection {
    id: ConnectionId,
    user_id: Option<String>,
    closed: AtomicBool,
    /// Write end of the pipe; taken on close so later writes no-op.
    writer: Mutex<Option<DuplexStream>>,
    heartbeat: StdMutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Create a connection and return it together with the read end of its
    /// pipe, which the routing layer streams to the peer.
    pub fn new(options: ConnectionOptions) -> (Arc<Self>, DuplexStream) {
        let (writer, reader) = tokio::io::duplex(options.pipe_capacity);
        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            user_id: options.user_id,
            closed: AtomicBool::new(false),
            writer: Mutex::new(Some(writer)),
            heartbeat: StdMutex::new(None),
        });
        (connection, reader)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Serialize a record and write it out. A failed write closes the
    /// connection; the caller learns nothing beyond the closed state.
    pub async fn send(&self, record: &Record) {
        self.write(wire::encode(record).as_bytes()).await;
    }

    async fn write(&self, bytes: &[u8]) {
        if self.is_closed() {
            debug!("dropping write to closed connection {}", self.id);
            return;
        }
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return;
        };
        let result = match writer.write_all(bytes).await {
            Ok(()) => writer.flush().await,
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            warn!("write to connection {} failed, closing: {}", self.id, error);
            guard.take();
            self.closed.store(true, Ordering::SeqCst);
            drop(guard);
            self.stop_heartbeat();
        }
    }

    /// Start (or restart) the keep-alive timer. Each tick writes a
    /// comment-framed `: ping <unix-ms>`; a failed write closes the
    /// connection and the timer winds down with it.
    pub fn start_heartbeat(self: &Arc<Self>, interval: Duration) {
        let mut slot = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        if self.is_closed() {
            return;
        }
        let connection = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval is immediate; skip it so
            // the first ping lands one interval after the connection opens.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if connection.is_closed() {
                    break;
                }
                connection
                    .write(wire::heartbeat(unix_ms()).as_bytes())
                    .await;
            }
        }));
    }

    pub fn stop_heartbeat(&self) {
        let handle = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Close the connection. Idempotent: a second call is a no-op. The
    /// write-end shutdown failure is swallowed; the peer may already be
    /// gone.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_heartbeat();
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            if let Err(error) = writer.shutdown().await {
                debug!("shutdown of connection {}: {}", self.id, error);
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
