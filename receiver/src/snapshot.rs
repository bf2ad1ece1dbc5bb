use std::sync::Arc;

use serde_json::Value;

use crate::transport::{ReadyState, TransportError};

/// Immutable view of the connection, replaced wholesale on every update so
/// observers can diff cheaply. `connected` always equals
/// `ready_state == Open`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub url: String,
    pub connected: bool,
    pub ready_state: ReadyState,
    pub last_event_id: Option<String>,
    pub last_event_name: Option<String>,
    pub last_data: Value,
    pub error: Option<Arc<TransportError>>,
}

impl Snapshot {
    pub(crate) fn initial(url: String, last_event_id: Option<String>) -> Self {
        Self {
            url,
            connected: false,
            ready_state: ReadyState::Closed,
            last_event_id,
            last_event_name: None,
            last_data: Value::Null,
            error: None,
        }
    }
}
