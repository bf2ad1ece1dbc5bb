use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outbound event as handed to the sender side.
///
/// `data` carries either already-text payloads (`Value::String`) or
/// structured data; the frame encoder writes text payloads literally and
/// everything else as its JSON encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Event name. Absent means the default/unnamed event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Event payload.
    pub data: Value,

    /// Event id, offered to receivers as a resume hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Reconnection-time hint in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl Record {
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            event: None,
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }
}
