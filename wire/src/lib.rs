//! Wire format for one-way event push over a long-lived text stream.
//!
//! Everything the two halves of the system agree on lives here, so that
//! neither the `sender` nor the `receiver` crate depends on the other:
//!
//! - `record`: the outbound [`Record`] a publisher hands to a connection.
//! - `frame`: text framing, encoding a [`Record`] into the line-oriented
//!   wire format, plus comment/keep-alive frames.
//! - `parser`: the incremental [`FrameParser`] that turns a byte stream back
//!   into [`Frame`]s on the receiving side.
//! - `url`: [`Endpoint`] construction with query filtering and
//!   percent-encoding.
//!
//! A frame is a sequence of optional `id:`, `event:`, `retry:` and `data:`
//! lines terminated by a blank line. Lines starting with `:` are comments and
//! are never dispatched as events; the sender uses them for keep-alives.

pub mod frame;
pub mod parser;
pub mod record;
pub mod url;

pub use frame::{comment, encode, heartbeat};
pub use parser::{Frame, FrameParser};
pub use record::Record;
pub use url::Endpoint;

use serde_json::Value;

/// Default payload decoder: structured decode with string fallback.
///
/// A payload that does not parse as JSON is returned as the literal string:
/// decode failure is recovered locally and never surfaced as an error.
pub fn decode_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
