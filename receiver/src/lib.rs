//! Receiver half of the event-push system.
//!
//! A [`Client`] maintains a resilient connection to a push endpoint and
//! exposes a typed publish/subscribe surface over the events arriving on it.
//!
//! # Architecture
//!
//! - **Connection state machine** ([`client::Client`]): owns the underlying
//!   stream handle, drives connect/disconnect/subscribe, publishes an
//!   immutable [`Snapshot`] after every change.
//! - **Reconnect policy** ([`backoff::ReconnectOptions`]): pure, jitter-free
//!   exponential backoff so retry behavior is deterministic under test.
//! - **Listener registry** ([`listeners`]): event names to handler sets,
//!   plus the protocol keeping low-level dispatchers attached exactly for
//!   the non-reserved names that have handlers.
//! - **Transport boundary** ([`transport`]): the state machine talks to the
//!   network through the [`Transport`]/[`TransportHandle`] traits; the
//!   production implementation is [`HttpTransport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use receiver::{Client, HttpTransport, Options, Payload};
//!
//! let client = Client::new(
//!     wire::Endpoint::new("https://api.example.com/events")
//!         .param("user_id", Some("u1")),
//!     Arc::new(HttpTransport::new()),
//!     Options { enabled: true, ..Options::default() },
//! );
//! let subscription = client.subscribe("notification", |payload| {
//!     if let Payload::Named { data, .. } = payload {
//!         println!("notification: {data}");
//!     }
//! });
//! ```
//!
//! Failure handling: decode failures fall back to the raw string, transport
//! failures surface through the reserved `error` event and trigger the
//! reconnect policy, and a panicking handler never starves its siblings.
//! Nothing in this crate is fatal to the process.

pub mod backoff;
pub mod client;
pub mod config;
pub mod http;
pub mod listeners;
pub mod snapshot;
pub mod transport;

pub use backoff::ReconnectOptions;
pub use client::{Client, Subscription};
pub use config::{Decoder, Options};
pub use http::HttpTransport;
pub use listeners::{EventName, Handler, Payload};
pub use snapshot::Snapshot;
pub use transport::{
    ConnectRequest, ReadyState, Transport, TransportError, TransportErrorKind, TransportHandle,
    TransportSignal,
};
