//! Sender half of the event-push system.
//!
//! This crate pushes one-way events to connected receivers over long-lived
//! text streams.
//!
//! # Architecture
//!
//! - **One connection per inbound request**: the routing layer calls
//!   [`Manager::create_client`], streams the returned read end back as the
//!   response body (see [`handler::event_stream_response`]), and the
//!   connection owns the write end.
//! - **Dual-index registry**: O(1) lookups by connection id and by user id,
//!   both indices updated atomically so fan-out never observes half a
//!   mutation.
//! - **Targeted and broadcast fan-out**: [`Manager::send_to_client`],
//!   [`Manager::send_to_user`] and [`Manager::broadcast`] write to all
//!   targets concurrently; one dead connection never blocks the rest.
//! - **Per-connection heartbeat**: comment-framed keep-alives
//!   (`: ping <unix-ms>`) so idle connections survive proxies; a failed
//!   heartbeat closes the connection.
//! - **Ephemeral delivery**: a receiver that is offline misses the event;
//!   there is no persistence or replay here.
//!
//! # Example: fan an event out to a user
//!
//! ```rust,ignore
//! use sender::Manager;
//! use wire::Record;
//!
//! # async fn example(manager: &Manager) {
//! manager
//!     .send_to_user(
//!         "u1",
//!         &Record::new(serde_json::json!({"unread": 3})).with_event("notification"),
//!     )
//!     .await;
//! # }
//! ```

pub mod connection;
pub mod handler;
pub mod manager;
pub mod registry;

pub use connection::{Connection, ConnectionId, ConnectionOptions, DEFAULT_HEARTBEAT_INTERVAL};
pub use handler::event_stream_response;
pub use manager::Manager;
pub use registry::ConnectionRegistry;
