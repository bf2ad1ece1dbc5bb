use crate::record::Record;
use serde_json::Value;

/// Encode a [`Record`] into one wire frame.
///
/// Field order is `id`, `event`, `retry`, `data`, followed by the blank-line
/// terminator. A payload containing newlines is emitted as consecutive
/// `data:` lines; the parser re-joins them with `\n`.
pub fn encode(record: &Record) -> String {
    let mut out = String::new();
    if let Some(id) = &record.id {
        out.push_str("id: ");
        out.push_str(id);
        out.push('\n');
    }
    if let Some(event) = &record.event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    if let Some(retry) = record.retry {
        out.push_str("retry: ");
        out.push_str(&retry.to_string());
        out.push('\n');
    }
    let payload = match &record.data {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    for line in payload.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Encode a comment frame. Comments are not dispatched as events.
pub fn comment(text: &str) -> String {
    format!(": {text}\n\n")
}

/// The keep-alive frame written by connection heartbeats.
pub fn heartbeat(unix_ms: u64) -> String {
    comment(&format!("ping {unix_ms}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_all_fields_in_order() {
        let record = Record::new(json!({"a": 1})).with_event("x").with_id("42");
        assert_eq!(encode(&record), "id: 42\nevent: x\ndata: {\"a\":1}\n\n");
    }

    #[test]
    fn text_payload_is_written_literally() {
        let record = Record::new("hello world");
        assert_eq!(encode(&record), "data: hello world\n\n");
    }

    #[test]
    fn structured_payload_is_json_encoded() {
        let record = Record::new(json!([1, 2, 3]));
        assert_eq!(encode(&record), "data: [1,2,3]\n\n");
    }

    #[test]
    fn retry_line_is_included_when_set() {
        let record = Record::new("x").with_retry(3000);
        assert_eq!(encode(&record), "retry: 3000\ndata: x\n\n");
    }

    #[test]
    fn multiline_text_becomes_consecutive_data_lines() {
        let record = Record::new("line one\nline two");
        assert_eq!(encode(&record), "data: line one\ndata: line two\n\n");
    }

    #[test]
    fn heartbeat_is_a_comment_frame() {
        assert_eq!(heartbeat(1700000000000), ": ping 1700000000000\n\n");
    }
}
