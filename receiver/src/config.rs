use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::backoff::ReconnectOptions;

/// Payload decoder. The default attempts a structured decode and falls back
/// to the raw string; see [`wire::decode_payload`].
pub type Decoder = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Receiver configuration.
#[derive(Clone)]
pub struct Options {
    /// Connect automatically on creation.
    pub enabled: bool,
    /// Ask the transport to send credentials (cookies) with the request.
    pub with_credentials: bool,
    /// Initial resume hint offered to the transport as `Last-Event-ID`.
    pub last_event_id: Option<String>,
    /// Payload decoder.
    pub parse: Decoder,
    /// Reconnect policy.
    pub reconnect: ReconnectOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enabled: false,
            with_credentials: false,
            last_event_id: None,
            parse: Arc::new(|raw: &str| wire::decode_payload(raw)),
            reconnect: ReconnectOptions::default(),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Options")
            .field("enabled", &self.enabled)
            .field("with_credentials", &self.with_credentials)
            .field("last_event_id", &self.last_event_id)
            .field("parse", &"<decoder>")
            .field("reconnect", &self.reconnect)
            .finish()
    }
}
