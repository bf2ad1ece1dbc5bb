//! HTTP transport: a long-lived GET with `Accept: text/event-stream`,
//! feeding the wire parser and forwarding frames as transport signals.
//!
//! Reconnecting is NOT done here. The connection state machine owns the
//! retry policy, so this transport reports every failure as terminal
//! (`ReadyState::Closed`) and stops.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use log::*;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use wire::FrameParser;

use crate::transport::{
    ConnectRequest, ReadyState, Transport, TransportError, TransportHandle, TransportSignal,
};

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Use a pre-configured client (proxies, default headers, TLS, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

struct Shared {
    state: AtomicU8,
    attached: Mutex<HashSet<String>>,
}

impl Shared {
    fn set_state(&self, state: ReadyState) {
        self.state.store(state.code(), Ordering::SeqCst);
    }

    fn delivers(&self, name: &str) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}

impl Transport for HttpTransport {
    fn open(
        &self,
        request: ConnectRequest,
        signals: UnboundedSender<TransportSignal>,
    ) -> Box<dyn TransportHandle> {
        let shared = Arc::new(Shared {
            state: AtomicU8::new(ReadyState::Connecting.code()),
            attached: Mutex::new(HashSet::new()),
        });
        // Credentialed requests carry a cookie jar; otherwise reuse the
        // transport-wide client.
        let client = if request.with_credentials {
            reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .unwrap_or_else(|_| self.client.clone())
        } else {
            self.client.clone()
        };
        let task = tokio::spawn(run_stream(client, request, signals, shared.clone()));
        Box::new(HttpHandle { shared, task })
    }
}

struct HttpHandle {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl TransportHandle for HttpHandle {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_code(self.shared.state.load(Ordering::SeqCst))
    }

    fn attach(&mut self, name: &str) {
        self.shared
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
    }

    fn detach(&mut self, name: &str) {
        self.shared
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    fn close(&mut self) {
        self.shared.set_state(ReadyState::Closed);
        self.task.abort();
    }
}

async fn run_stream(
    client: reqwest::Client,
    request: ConnectRequest,
    signals: UnboundedSender<TransportSignal>,
    shared: Arc<Shared>,
) {
    let mut http_request = client
        .get(&request.url)
        .header("Accept", "text/event-stream");
    if let Some(id) = &request.last_event_id {
        http_request = http_request.header("Last-Event-ID", id);
    }

    let response = match http_request.send().await {
        Ok(response) => response,
        Err(error) => {
            shared.set_state(ReadyState::Closed);
            let _ = signals.send(TransportSignal::Failed(TransportError::connect(error)));
            return;
        }
    };
    if !response.status().is_success() {
        shared.set_state(ReadyState::Closed);
        let _ = signals.send(TransportSignal::Failed(TransportError::status(
            response.status().as_u16(),
        )));
        return;
    }

    shared.set_state(ReadyState::Open);
    if signals.send(TransportSignal::Opened).is_err() {
        return;
    }

    let mut parser = FrameParser::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for frame in parser.feed(&bytes) {
                    let deliver = match &frame.event {
                        None => true,
                        Some(name) => shared.delivers(name),
                    };
                    if !deliver {
                        trace!("dropping frame for unattached event");
                        continue;
                    }
                    if signals.send(TransportSignal::Frame(frame)).is_err() {
                        return;
                    }
                }
            }
            Err(error) => {
                shared.set_state(ReadyState::Closed);
                let _ = signals.send(TransportSignal::Failed(TransportError::stream(error)));
                return;
            }
        }
    }

    // Orderly end of body: the server hung up.
    shared.set_state(ReadyState::Closed);
    let _ = signals.send(TransportSignal::Failed(TransportError::closed()));
}
