//! Connection state machine.
//!
//! One [`Client`] owns one underlying stream handle at a time and composes
//! the reconnect policy with the listener registry. A driver task consumes
//! the transport's signal channel sequentially; external calls to
//! [`Client::connect`]/[`Client::disconnect`]/[`Client::subscribe`]
//! interleave with it and are treated as re-entrant: `connect()` fully
//! tears the prior handle down before opening a new one, and a generation
//! counter gates out signals from handles that have been torn down.
//!
//! Handlers are collected under the state lock but invoked after it is
//! released, so a handler may re-enter the client without deadlocking.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::*;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use wire::Endpoint;

use crate::config::Options;
use crate::listeners::{dispatch, EventName, ListenerRegistry, Payload};
use crate::snapshot::Snapshot;
use crate::transport::{
    ConnectRequest, ReadyState, Transport, TransportHandle, TransportSignal,
};

/// The receiver half: a resilient connection to a push endpoint with a typed
/// publish/subscribe surface.
///
/// Cloning hands out another handle to the same connection. Must be used
/// inside a tokio runtime, since connecting spawns the driver task.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    url: String,
    options: Options,
    transport: Arc<dyn Transport>,
    listeners: ListenerRegistry,
    handle: Option<Box<dyn TransportHandle>>,
    driver: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
    attempt: u32,
    destroyed: bool,
    generation: u64,
    snapshot: Snapshot,
    state_tx: watch::Sender<Snapshot>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn publish(inner: &mut Inner) {
    inner.state_tx.send_replace(inner.snapshot.clone());
}

impl Client {
    pub fn new(
        endpoint: impl Into<Endpoint>,
        transport: Arc<dyn Transport>,
        options: Options,
    ) -> Self {
        let url = endpoint.into().build();
        let enabled = options.enabled;
        let snapshot = Snapshot::initial(url.clone(), options.last_event_id.clone());
        let (state_tx, _) = watch::channel(snapshot.clone());
        let client = Self {
            inner: Arc::new(Mutex::new(Inner {
                url,
                options,
                transport,
                listeners: ListenerRegistry::new(),
                handle: None,
                driver: None,
                retry_timer: None,
                attempt: 0,
                destroyed: false,
                generation: 0,
                snapshot,
                state_tx,
            })),
        };
        if enabled {
            client.connect();
        }
        client
    }

    /// Current connection snapshot.
    pub fn state(&self) -> Snapshot {
        lock(&self.inner).snapshot.clone()
    }

    /// Watch snapshot replacements as they are published.
    pub fn state_stream(&self) -> watch::Receiver<Snapshot> {
        lock(&self.inner).state_tx.subscribe()
    }

    /// Open the connection. A no-op (with a warning) while the underlying
    /// handle reports open; otherwise any prior handle is fully torn down
    /// first, then a fresh one is opened.
    pub fn connect(&self) {
        Self::do_connect(&self.inner, None);
    }

    /// Close the connection and stop auto-reconnect until the next
    /// [`Client::connect`]. Synchronously cancels any pending retry timer
    /// and detaches all dispatchers; no dispatch for the torn-down handle
    /// fires afterwards.
    pub fn disconnect(&self) {
        let mut inner = lock(&self.inner);
        inner.destroyed = true;
        Self::teardown(&mut inner);
        let previous = inner.snapshot.clone();
        inner.snapshot = Snapshot {
            connected: false,
            ready_state: ReadyState::Closed,
            // The resume hint survives auto-reconnects but not an explicit
            // disconnect.
            last_event_id: inner.options.last_event_id.clone(),
            ..previous
        };
        publish(&mut inner);
        info!("event stream disconnected: {}", inner.url);
    }

    /// Register a handler. Non-reserved names get a low-level dispatcher
    /// attached immediately when a live handle exists, otherwise at the next
    /// successful open. The returned [`Subscription`] removes the handler;
    /// removing the last handler for a name detaches its dispatcher.
    pub fn subscribe(
        &self,
        name: impl Into<EventName>,
        handler: impl Fn(&Payload) + Send + Sync + 'static,
    ) -> Subscription {
        let name = name.into();
        let mut inner = lock(&self.inner);
        let token = inner.listeners.add(name.clone(), Arc::new(handler));
        if let EventName::Named(event) = &name {
            let Inner {
                handle, listeners, ..
            } = &mut *inner;
            if !listeners.is_attached(event) {
                if let Some(handle) = handle.as_mut() {
                    if handle.ready_state() != ReadyState::Closed {
                        handle.attach(event);
                        listeners.mark_attached(event);
                    }
                }
            }
        }
        Subscription {
            inner: Arc::downgrade(&self.inner),
            name,
            token,
        }
    }

    /// `retry_of` carries the generation a retry timer was scheduled under;
    /// a retry whose epoch was torn down in the meantime must not reopen.
    /// Only an external `connect()` (retry_of = None) clears `destroyed`.
    fn do_connect(inner_arc: &Arc<Mutex<Inner>>, retry_of: Option<u64>) {
        let mut inner = lock(inner_arc);
        if let Some(generation) = retry_of {
            if inner.generation != generation || inner.destroyed {
                return;
            }
        }
        if let Some(handle) = &inner.handle {
            if handle.ready_state() == ReadyState::Open {
                warn!(
                    "connect() called while already connected to {}; ignoring",
                    inner.url
                );
                return;
            }
        }
        inner.destroyed = false;
        Self::teardown(&mut inner);

        let (signals_tx, mut signals_rx) = mpsc::unbounded_channel();
        let request = ConnectRequest {
            url: inner.url.clone(),
            with_credentials: inner.options.with_credentials,
            last_event_id: inner.snapshot.last_event_id.clone(),
        };
        debug!("opening event stream to {}", inner.url);
        let handle = inner.transport.open(request, signals_tx);
        inner.handle = Some(handle);

        let previous = inner.snapshot.clone();
        inner.snapshot = Snapshot {
            connected: false,
            ready_state: ReadyState::Connecting,
            error: None,
            ..previous
        };
        publish(&mut inner);

        let generation = inner.generation;
        let weak = Arc::downgrade(inner_arc);
        inner.driver = Some(tokio::spawn(async move {
            while let Some(signal) = signals_rx.recv().await {
                let Some(inner_arc) = weak.upgrade() else {
                    break;
                };
                Self::on_signal(&inner_arc, generation, signal);
            }
        }));
    }

    /// Idempotent cleanup of the current handle: invalidate in-flight
    /// signals, cancel the retry timer, stop the driver, detach and close.
    fn teardown(inner: &mut Inner) {
        inner.generation += 1;
        if let Some(timer) = inner.retry_timer.take() {
            timer.abort();
        }
        if let Some(driver) = inner.driver.take() {
            driver.abort();
        }
        if let Some(mut handle) = inner.handle.take() {
            for name in inner.listeners.attached_names() {
                handle.detach(&name);
            }
            handle.close();
        }
        inner.listeners.clear_attached();
    }

    fn on_signal(inner_arc: &Arc<Mutex<Inner>>, generation: u64, signal: TransportSignal) {
        let mut inner = lock(inner_arc);
        if inner.generation != generation {
            return;
        }
        match signal {
            TransportSignal::Opened => {
                inner.attempt = 0;
                let previous = inner.snapshot.clone();
                inner.snapshot = Snapshot {
                    connected: true,
                    ready_state: ReadyState::Open,
                    error: None,
                    ..previous
                };
                publish(&mut inner);
                info!("event stream open: {}", inner.url);

                // A fresh handle has no dispatchers; attach one for every
                // name currently carrying handlers.
                let Inner {
                    handle, listeners, ..
                } = &mut *inner;
                if let Some(handle) = handle.as_mut() {
                    for name in listeners.named_with_handlers() {
                        if !listeners.is_attached(&name) {
                            handle.attach(&name);
                            listeners.mark_attached(&name);
                        }
                    }
                }

                let handlers = inner.listeners.handlers_for(&EventName::Open);
                drop(inner);
                dispatch(&handlers, &Payload::Open);
            }
            TransportSignal::Failed(error) => {
                let error = Arc::new(error);
                let ready_state = inner
                    .handle
                    .as_ref()
                    .map(|handle| handle.ready_state())
                    .unwrap_or(ReadyState::Closed);
                let previous = inner.snapshot.clone();
                inner.snapshot = Snapshot {
                    connected: false,
                    ready_state,
                    error: Some(error.clone()),
                    ..previous
                };
                publish(&mut inner);
                warn!("event stream error on {}: {}", inner.url, error);

                if ready_state == ReadyState::Closed {
                    Self::schedule_reconnect(inner_arc, &mut inner);
                }

                let handlers = inner.listeners.handlers_for(&EventName::Error);
                drop(inner);
                dispatch(&handlers, &Payload::Error(error));
            }
            TransportSignal::Frame(frame) => {
                // Reserved names other than "message" must not arrive off
                // the wire; "message" behaves like an unnamed frame.
                let named = match frame.event.as_deref() {
                    None | Some("message") => None,
                    Some("open") | Some("error") => {
                        debug!("ignoring wire frame named after a reserved event");
                        return;
                    }
                    Some(name) => Some(name.to_string()),
                };

                let data = (inner.options.parse.as_ref())(&frame.data);
                let event_name = named.as_deref().unwrap_or("message").to_string();
                let previous = inner.snapshot.clone();
                inner.snapshot = Snapshot {
                    // Carried over when this frame has no id of its own.
                    last_event_id: frame.id.clone().or(previous.last_event_id.clone()),
                    last_event_name: Some(event_name),
                    last_data: data.clone(),
                    ..previous
                };
                publish(&mut inner);

                let (key, payload) = match named {
                    Some(name) => (
                        EventName::Named(name.clone()),
                        Payload::Named { name, data, frame },
                    ),
                    None => (EventName::Message, Payload::Message { data, frame }),
                };
                let handlers = inner.listeners.handlers_for(&key);
                drop(inner);
                dispatch(&handlers, &payload);
            }
        }
    }

    /// Evaluate the reconnect policy after a terminal failure. The attempt
    /// counter is incremented at scheduling time and the delay computed from
    /// its pre-increment value; logging is 1-based.
    fn schedule_reconnect(inner_arc: &Arc<Mutex<Inner>>, inner: &mut Inner) {
        let options = inner.options.reconnect.clone();
        if !options.enabled || inner.destroyed {
            return;
        }
        if inner.attempt >= options.max_retries {
            warn!(
                "giving up on {} after {} reconnect attempts",
                inner.url, options.max_retries
            );
            return;
        }
        let delay = options.delay_for(inner.attempt);
        inner.attempt += 1;
        info!(
            "reconnecting to {} in {:?} (attempt {} of {})",
            inner.url, delay, inner.attempt, options.max_retries
        );
        let generation = inner.generation;
        let weak = Arc::downgrade(inner_arc);
        inner.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner_arc) = weak.upgrade() {
                Self::do_connect(&inner_arc, Some(generation));
            }
        }));
    }
}

/// Removes a handler registered with [`Client::subscribe`].
#[must_use = "dropping a Subscription without calling unsubscribe() leaves the handler registered"]
pub struct Subscription {
    inner: Weak<Mutex<Inner>>,
    name: EventName,
    token: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(inner_arc) = self.inner.upgrade() else {
            return;
        };
        let mut inner = lock(&inner_arc);
        let now_empty = inner.listeners.remove(&self.name, self.token);
        if !now_empty {
            return;
        }
        if let EventName::Named(event) = &self.name {
            let Inner {
                handle, listeners, ..
            } = &mut *inner;
            if listeners.is_attached(event) {
                if let Some(handle) = handle.as_mut() {
                    handle.detach(event);
                }
                listeners.mark_detached(event);
            }
        }
    }
}
