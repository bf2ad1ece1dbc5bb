//! Listener registry: event names to handler sets, plus the bookkeeping of
//! which names have a low-level dispatcher attached on the live stream.
//!
//! The registry has no network awareness. The state machine consults
//! [`ListenerRegistry::named_with_handlers`] after each open to attach
//! dispatchers, and keeps the attached set equal to the set of non-reserved
//! names with at least one handler.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::*;
use serde_json::Value;
use wire::Frame;

use crate::transport::TransportError;

/// An event a handler can be registered for.
///
/// `open`, `error` and `message` are reserved: their payload shapes are
/// fixed and their dispatch is wired directly into the state machine, never
/// attached or detached dynamically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    Open,
    Error,
    Message,
    Named(String),
}

impl EventName {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.as_str() {
            "open" => EventName::Open,
            "error" => EventName::Error,
            "message" => EventName::Message,
            _ => EventName::Named(name),
        }
    }

    pub fn is_reserved(&self) -> bool {
        !matches!(self, EventName::Named(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventName::Open => "open",
            EventName::Error => "error",
            EventName::Message => "message",
            EventName::Named(name) => name,
        }
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        EventName::named(name)
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        EventName::named(name)
    }
}

/// What a handler receives, typed per reserved/named event.
#[derive(Debug, Clone)]
pub enum Payload {
    Open,
    Error(Arc<TransportError>),
    Message { data: Value, frame: Frame },
    Named { name: String, data: Value, frame: Frame },
}

pub type Handler = Arc<dyn Fn(&Payload) + Send + Sync>;

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    handlers: HashMap<EventName, Vec<(u64, Handler)>>,
    attached: HashSet<String>,
    next_token: u64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: EventName, handler: Handler) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.handlers.entry(name).or_default().push((token, handler));
        token
    }

    /// Remove one handler. Returns true when the name has no handlers left.
    pub fn remove(&mut self, name: &EventName, token: u64) -> bool {
        let Some(entries) = self.handlers.get_mut(name) else {
            return false;
        };
        entries.retain(|(entry_token, _)| *entry_token != token);
        if entries.is_empty() {
            self.handlers.remove(name);
            return true;
        }
        false
    }

    /// Handlers currently registered for a name, in registration order.
    pub fn handlers_for(&self, name: &EventName) -> Vec<Handler> {
        self.handlers
            .get(name)
            .map(|entries| entries.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Non-reserved names with at least one handler.
    pub fn named_with_handlers(&self) -> Vec<String> {
        self.handlers
            .keys()
            .filter_map(|name| match name {
                EventName::Named(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_attached(&self, name: &str) -> bool {
        self.attached.contains(name)
    }

    pub fn mark_attached(&mut self, name: &str) {
        self.attached.insert(name.to_string());
    }

    pub fn mark_detached(&mut self, name: &str) {
        self.attached.remove(name);
    }

    pub fn attached_names(&self) -> Vec<String> {
        self.attached.iter().cloned().collect()
    }

    pub fn clear_attached(&mut self) {
        self.attached.clear();
    }
}

/// Invoke handlers in order, isolating each failure: a panicking handler is
/// reported and must not prevent subsequent handlers from running.
pub(crate) fn dispatch(handlers: &[Handler], payload: &Payload) {
    for handler in handlers {
        let handler = handler.as_ref();
        if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
            error!("event handler panicked; continuing with remaining handlers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> Handler {
        Arc::new(|_| {})
    }

    #[test]
    fn reserved_names_fold_into_variants() {
        assert_eq!(EventName::named("open"), EventName::Open);
        assert_eq!(EventName::named("error"), EventName::Error);
        assert_eq!(EventName::named("message"), EventName::Message);
        assert_eq!(
            EventName::named("notification"),
            EventName::Named("notification".to_string())
        );
        assert!(EventName::Open.is_reserved());
        assert!(!EventName::named("notification").is_reserved());
    }

    #[test]
    fn remove_reports_when_last_handler_goes() {
        let mut registry = ListenerRegistry::new();
        let name = EventName::named("tick");
        let first = registry.add(name.clone(), noop());
        let second = registry.add(name.clone(), noop());
        assert!(!registry.remove(&name, first));
        assert!(registry.remove(&name, second));
        assert!(registry.handlers_for(&name).is_empty());
    }

    #[test]
    fn named_with_handlers_excludes_reserved() {
        let mut registry = ListenerRegistry::new();
        registry.add(EventName::Open, noop());
        registry.add(EventName::named("a"), noop());
        registry.add(EventName::named("b"), noop());
        let mut names = registry.named_with_handlers();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut registry = ListenerRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            registry.add(
                EventName::named("tick"),
                Arc::new(move |_| order.lock().unwrap().push(tag)),
            );
        }
        dispatch(
            &registry.handlers_for(&EventName::named("tick")),
            &Payload::Open,
        );
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn panicking_handler_does_not_starve_siblings() {
        let mut registry = ListenerRegistry::new();
        let name = EventName::named("notification");
        registry.add(name.clone(), Arc::new(|_| panic!("boom")));
        let reached = Arc::new(AtomicUsize::new(0));
        let observed = reached.clone();
        registry.add(
            name.clone(),
            Arc::new(move |_| {
                observed.fetch_add(1, Ordering::SeqCst);
            }),
        );
        dispatch(&registry.handlers_for(&name), &Payload::Open);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }
}
