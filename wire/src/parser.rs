/// One parsed wire frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
    pub retry: Option<u64>,
}

/// Incremental frame parser.
///
/// Feed it byte chunks as they arrive off the stream; completed frames are
/// returned as soon as their blank-line terminator is seen. Chunk boundaries
/// may fall anywhere, including inside a line or a multi-byte character.
///
/// The parser is forgiving by protocol design: comment lines (leading `:`)
/// and unknown field names are ignored, and a malformed `retry` value is
/// dropped rather than reported.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    id: Option<String>,
    event: Option<String>,
    data_lines: Vec<String>,
    retry: Option<u64>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw[..newline]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
            } else {
                self.field(line);
            }
        }
        frames
    }

    fn field(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (name, value) = match line.find(':') {
            Some(colon) => {
                let value = &line[colon + 1..];
                (&line[..colon], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match name {
            "id" => self.id = Some(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "retry" => self.retry = value.parse().ok(),
            "data" => self.data_lines.push(value.to_string()),
            _ => {}
        }
    }

    /// A blank line terminates the pending frame. Blank lines with nothing
    /// accumulated (e.g. following a comment) produce no frame.
    fn take_frame(&mut self) -> Option<Frame> {
        if self.id.is_none()
            && self.event.is_none()
            && self.retry.is_none()
            && self.data_lines.is_empty()
        {
            return None;
        }
        let mut lines = std::mem::take(&mut self.data_lines);
        let data = match lines.len() {
            0 => String::new(),
            1 => lines.pop().unwrap_or_default(),
            _ => lines.join("\n"),
        };
        Some(Frame {
            id: self.id.take(),
            event: self.event.take(),
            data,
            retry: self.retry.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode, heartbeat};
    use crate::record::Record;
    use serde_json::json;

    #[test]
    fn parses_an_encoded_frame_back() {
        let record = Record::new(json!({"a": 1})).with_event("x").with_id("42");
        let mut parser = FrameParser::new();
        let frames = parser.feed(encode(&record).as_bytes());
        assert_eq!(
            frames,
            vec![Frame {
                id: Some("42".to_string()),
                event: Some("x".to_string()),
                data: "{\"a\":1}".to_string(),
                retry: None,
            }]
        );
    }

    #[test]
    fn round_trip_through_default_decoder() {
        let record = Record::new(json!({"a": 1})).with_event("x").with_id("42");
        let mut parser = FrameParser::new();
        let frames = parser.feed(encode(&record).as_bytes());
        assert_eq!(frames.len(), 1);
        assert_eq!(crate::decode_payload(&frames[0].data), json!({"a": 1}));
    }

    #[test]
    fn handles_arbitrary_chunk_boundaries() {
        let wire = "id: 7\nevent: tick\ndata: one\ndata: two\n\n";
        let mut parser = FrameParser::new();
        let mut frames = Vec::new();
        for byte in wire.as_bytes() {
            frames.extend(parser.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].event.as_deref(), Some("tick"));
        assert_eq!(frames[0].data, "one\ntwo");
    }

    #[test]
    fn comments_are_not_dispatched() {
        let mut parser = FrameParser::new();
        assert!(parser.feed(heartbeat(123).as_bytes()).is_empty());
        // A comment inside a frame does not disturb its fields either.
        let frames = parser.feed(b"data: x\n: ping 456\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn unknown_fields_and_bad_retry_are_ignored() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(b"whatever: y\nretry: soon\ndata: x\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].retry, None);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn retry_is_parsed_when_numeric() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(b"retry: 3000\ndata: x\n\n");
        assert_eq!(frames[0].retry, Some(3000));
    }

    #[test]
    fn crlf_lines_are_accepted() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(b"event: x\r\ndata: y\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("x"));
        assert_eq!(frames[0].data, "y");
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(b"data: 1\n\ndata: 2\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "1");
        assert_eq!(frames[1].data, "2");
    }
}
