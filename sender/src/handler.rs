//! Routing-layer boundary.
//!
//! The HTTP layer creates one connection per inbound request and streams
//! the connection's read end back as a `text/event-stream` body. This
//! module builds that response; route wiring and authentication stay with
//! the application.

use async_stream::stream;
use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use log::*;
use tokio::io::DuplexStream;
use tokio_util::io::ReaderStream;

use crate::connection::ConnectionId;
use crate::manager::Manager;

/// Build the long-lived event-stream response for a registered connection.
///
/// The body forwards bytes off the read end until the connection's write
/// end shuts down, then deregisters the connection. A peer that goes away
/// instead is detected by the connection's next write (or heartbeat), which
/// closes it and lets the registry reap it.
pub fn event_stream_response(
    manager: Manager,
    connection_id: ConnectionId,
    reader: DuplexStream,
) -> Response {
    let body = stream! {
        let mut chunks = ReaderStream::new(reader);
        while let Some(chunk) = chunks.next().await {
            yield chunk;
        }
        debug!("event stream for connection {connection_id} ended, cleaning up");
        manager.remove_connection(&connection_id).await;
    };
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
