//! Boundary between the connection state machine and whatever actually moves
//! bytes.
//!
//! A transport is handed a [`ConnectRequest`] and a signal channel, and
//! returns a single teardown handle. Everything the connection learns about
//! the underlying stream arrives as a [`TransportSignal`]; everything it asks
//! of the stream goes through the [`TransportHandle`]. Closing the handle is
//! the one cancellation operation; after it, the transport must stop
//! producing signals.

use std::error::Error as StdError;
use std::fmt;

use tokio::sync::mpsc::UnboundedSender;
use wire::Frame;

/// Lifecycle state reported by the underlying stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closed = 2,
}

impl ReadyState {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            _ => ReadyState::Closed,
        }
    }
}

/// What the state machine asks a transport to open.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub url: String,
    pub with_credentials: bool,
    /// Resume hint, forwarded as `Last-Event-ID` by transports that can.
    pub last_event_id: Option<String>,
}

/// Everything a transport reports back to the state machine.
#[derive(Debug)]
pub enum TransportSignal {
    /// The stream is established and delivering.
    Opened,
    /// The stream failed or ended. Whether the failure is terminal is read
    /// off the handle's [`ReadyState`], not off the error itself.
    Failed(TransportError),
    /// One wire frame. Unnamed frames are always delivered; named frames
    /// only while their name is attached.
    Frame(Frame),
}

/// Opens underlying streams. Implementations must deliver signals for a
/// given open strictly in order, and stop delivering once the returned
/// handle is closed.
pub trait Transport: Send + Sync {
    fn open(
        &self,
        request: ConnectRequest,
        signals: UnboundedSender<TransportSignal>,
    ) -> Box<dyn TransportHandle>;
}

/// Teardown handle for one opened stream.
///
/// `attach`/`detach` control which named events the transport delivers;
/// the state machine keeps the attached set equal to the set of named
/// events with at least one registered handler.
pub trait TransportHandle: Send {
    fn ready_state(&self) -> ReadyState;
    fn attach(&mut self, name: &str);
    fn detach(&mut self, name: &str);
    fn close(&mut self);
}

/// Kinds of transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The stream could not be established.
    Connect,
    /// The stream broke after it was established.
    Stream,
    /// The server ended the stream.
    Closed,
}

/// A transport failure, surfaced through the reserved `error` event and the
/// snapshot's `error` field. Never fatal: the state machine answers it with
/// the reconnect policy.
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl TransportError {
    pub fn connect(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            kind: TransportErrorKind::Connect,
            message: "failed to establish event stream".to_string(),
            source: Some(source.into()),
        }
    }

    pub fn status(code: u16) -> Self {
        Self {
            kind: TransportErrorKind::Connect,
            message: format!("event stream endpoint answered with status {code}"),
            source: None,
        }
    }

    pub fn stream(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            kind: TransportErrorKind::Stream,
            message: "event stream interrupted".to_string(),
            source: Some(source.into()),
        }
    }

    pub fn closed() -> Self {
        Self {
            kind: TransportErrorKind::Closed,
            message: "event stream closed by the server".to_string(),
            source: None,
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => write!(f, "{}", self.message),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}
