//! SSE wire framing.
//!
//! An event is written as
//!
//! ```text
//! event: <name>
//! data: <fragment>
//! data: <fragment>
//!
//! ```
//!
//! where the fragments are the JSON payload split on its line feeds. Readers rebuild the
//! payload by concatenating every `data:` value of a frame without separators, which is
//! lossless for JSON since raw line feeds can only appear as insignificant whitespace.

use crate::error::Error;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const EVENT_FIELD: &str = "event";
pub const DATA_FIELD: &str = "data";

/// Name readers assign to a frame that carries no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// Written once when a stream opens, ahead of any event.
pub const PRIMER: &[u8] = b"\n";

/// Comment frame sent on idle streams. Decoders skip it.
pub const KEEP_ALIVE: &[u8] = b": keep-alive\n\n";

/// Reject event names that would break out of their `event:` line.
pub fn validate_event_name(event: &str) -> Result<(), Error> {
    if event.contains(['\n', '\r']) {
        return Err(Error::InvalidEventName(event.to_string()));
    }
    Ok(())
}

/// One event as it travels over the wire. `data` holds serialized JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

impl Frame {
    /// Serialize `data` as JSON and pair it with `event`.
    pub fn new(event: &str, data: &Value) -> Result<Self, Error> {
        Self::from_serialized(event, serde_json::to_string(data)?)
    }

    /// Wrap an already serialized payload. The payload may span several lines.
    pub fn from_serialized(event: &str, data: String) -> Result<Self, Error> {
        validate_event_name(event)?;
        Ok(Self {
            event: event.to_string(),
            data,
        })
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.event.len() + self.data.len() + 16);

        out.push_str(EVENT_FIELD);
        out.push_str(": ");
        out.push_str(&self.event);
        out.push('\n');

        for fragment in self.data.split('\n') {
            out.push_str(DATA_FIELD);
            out.push_str(": ");
            out.push_str(fragment);
            out.push('\n');
        }

        out.push('\n');
        out
    }

    /// Parse the payload back into a value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

/// Incremental frame parser for the receiving side of a stream.
///
/// Bytes can be fed in chunks of any size; a chunk boundary may fall anywhere, including
/// inside a multi-byte character or between the two bytes of a CRLF. Lines may end in LF,
/// CRLF or a bare CR.
#[derive(Debug, Default)]
pub struct Decoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a line ending.
    scanned: usize,
    after_cr: bool,
    event: Option<String>,
    data: String,
    has_data: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume `chunk` and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        for pos in self.scanned..self.buffer.len() {
            let byte = self.buffer[pos];

            // LF completing a CRLF
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                start = pos + 1;
                continue;
            }

            if byte == b'\n' || byte == b'\r' {
                let line = String::from_utf8_lossy(&self.buffer[start..pos]).into_owned();
                self.after_cr = byte == b'\r';
                start = pos + 1;

                if let Some(frame) = self.process_line(&line) {
                    frames.push(frame);
                }
            }
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        frames
    }

    /// True when no partial line or frame is buffered.
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty() && self.event.is_none() && !self.has_data
    }

    fn process_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return self.dispatch();
        }

        // Comment line
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            EVENT_FIELD => self.event = Some(value.to_string()),
            DATA_FIELD => {
                self.data.push_str(value);
                self.has_data = true;
            }
            // id, retry and unknown fields carry nothing we act on
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<Frame> {
        if self.event.is_none() && !self.has_data {
            return None;
        }

        let event = self
            .event
            .take()
            .unwrap_or_else(|| DEFAULT_EVENT.to_string());
        self.has_data = false;

        Some(Frame {
            event,
            data: std::mem::take(&mut self.data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(bytes: &[u8]) -> Vec<Frame> {
        let mut decoder = Decoder::new();
        let frames = decoder.feed(bytes);
        assert!(decoder.is_idle(), "decoder left with buffered input");
        frames
    }

    #[test]
    fn test_encode_simple_event() {
        let frame = Frame::new("simple", &json!(42)).unwrap();

        assert_eq!(frame.encode(), "event: simple\ndata: 42\n\n");
    }

    #[test]
    fn test_encode_splits_multiline_payload_into_data_lines() {
        let frame = Frame::from_serialized("pretty", "{\n  \"a\": 1\n}".to_string()).unwrap();

        assert_eq!(
            frame.encode(),
            "event: pretty\ndata: {\ndata:   \"a\": 1\ndata: }\n\n"
        );
    }

    #[test]
    fn test_encode_keeps_escaped_newlines_on_one_line() {
        let frame = Frame::new("newlines", &json!({"text": "foo\n\n\nbar"})).unwrap();

        assert_eq!(
            frame.encode(),
            "event: newlines\ndata: {\"text\":\"foo\\n\\n\\nbar\"}\n\n"
        );
    }

    #[test]
    fn test_event_name_with_line_break_is_rejected() {
        assert!(matches!(
            Frame::new("bad\nname", &Value::Null),
            Err(Error::InvalidEventName(_))
        ));
        assert!(matches!(
            validate_event_name("bad\rname"),
            Err(Error::InvalidEventName(_))
        ));
        assert!(validate_event_name("").is_ok());
    }

    #[test]
    fn test_payload_survives_the_wire() {
        let payloads = [
            json!(42),
            json!("foo\n\n\nbar"),
            json!({"text": "foo\n\n\nbar"}),
            json!({"a": 1, "b": [true, null, 2.5, {"nested": "x\r\ny"}]}),
            json!(null),
            json!(""),
        ];

        for payload in payloads {
            let wire = Frame::new("roundtrip", &payload).unwrap().encode();
            let frames = decode_all(wire.as_bytes());

            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].event, "roundtrip");
            assert_eq!(frames[0].json::<Value>().unwrap(), payload);
        }
    }

    #[test]
    fn test_pretty_printed_payload_survives_the_wire() {
        let payload = json!({"text": "foo\n\n\nbar", "list": [1, 2, 3]});
        let pretty = serde_json::to_string_pretty(&payload).unwrap();
        let wire = Frame::from_serialized("pretty", pretty).unwrap().encode();

        let frames = decode_all(wire.as_bytes());

        assert_eq!(frames[0].json::<Value>().unwrap(), payload);
    }

    #[test]
    fn test_decoder_skips_primer_and_keep_alive() {
        let mut wire = Vec::new();
        wire.extend_from_slice(PRIMER);
        wire.extend_from_slice(KEEP_ALIVE);
        wire.extend_from_slice(Frame::new("one", &json!(1)).unwrap().encode().as_bytes());
        wire.extend_from_slice(KEEP_ALIVE);
        wire.extend_from_slice(Frame::new("two", &json!(2)).unwrap().encode().as_bytes());

        let frames = decode_all(&wire);

        let events: Vec<&str> = frames.iter().map(|f| f.event.as_str()).collect();
        assert_eq!(events, vec!["one", "two"]);
    }

    #[test]
    fn test_decoder_handles_byte_at_a_time_input() {
        let payload = json!({"greeting": "héllo wörld ✓"});
        let wire = Frame::new("utf8", &payload).unwrap().encode();

        let mut decoder = Decoder::new();
        let mut frames = Vec::new();
        for byte in wire.as_bytes() {
            frames.extend(decoder.feed(std::slice::from_ref(byte)));
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].json::<Value>().unwrap(), payload);
    }

    #[test]
    fn test_decoder_accepts_crlf_and_unknown_fields() {
        let wire = b"id: 7\r\nretry: 1000\r\nevent: crlf\r\ndata:{\"a\":\r\ndata: 1}\r\n\r\n";

        let frames = decode_all(wire);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "crlf");
        assert_eq!(frames[0].data, "{\"a\":1}");
    }

    #[test]
    fn test_decoder_accepts_bare_cr() {
        let frames = decode_all(b"event: cr\rdata: 1\r\revent: two\rdata: 2\r\r");

        let events: Vec<&str> = frames.iter().map(|f| f.event.as_str()).collect();
        assert_eq!(events, vec!["cr", "two"]);
        assert_eq!(frames[1].data, "2");
    }

    #[test]
    fn test_decoder_joins_crlf_split_across_chunks() {
        let mut decoder = Decoder::new();

        assert!(decoder.feed(b"event: split\r").is_empty());
        assert!(decoder.feed(b"\ndata: 1\r").is_empty());
        let frames = decoder.feed(b"\n\r\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "split");
        assert_eq!(frames[0].data, "1");
    }

    #[test]
    fn test_decoder_handles_many_frames_in_one_chunk() {
        let mut wire = String::new();
        for i in 0..1000 {
            wire.push_str(&Frame::new("bulk", &json!(i)).unwrap().encode());
        }

        let frames = decode_all(wire.as_bytes());

        assert_eq!(frames.len(), 1000);
        assert_eq!(frames[999].json::<i64>().unwrap(), 999);
    }

    #[test]
    fn test_decoder_defaults_event_name() {
        let frames = decode_all(b"data: 1\n\n");

        assert_eq!(frames[0].event, DEFAULT_EVENT);
        assert_eq!(frames[0].json::<i64>().unwrap(), 1);
    }

    #[test]
    fn test_decoder_holds_incomplete_frame() {
        let mut decoder = Decoder::new();

        assert!(decoder.feed(b"event: one\ndata: 1\n").is_empty());
        assert!(!decoder.is_idle());

        let frames = decoder.feed(b"\n");
        assert_eq!(frames.len(), 1);
        assert!(decoder.is_idle());
    }
}
