//! Server-Sent Events framing.
//!
//! A `text/event-stream` body arrives as arbitrary byte chunks; frames are
//! separated by a blank line and may be split across chunks. [`SseDecoder`]
//! buffers bytes until a full frame is available and [`SseEvent::parse`]
//! turns one frame into its fields.

use tracing::trace;

/// One SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (`message` unless the server sent an `event:` field).
    pub event_type: String,
    /// Data payload; multiple `data:` lines are joined with `\n`.
    pub data: String,
    pub id: Option<String>,
    /// Reconnection hint from the server in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    pub const DEFAULT_TYPE: &'static str = "message";

    /// Parse a single frame (without its terminating blank line).
    ///
    /// Returns `None` for frames that carry no data, such as `: heartbeat`
    /// comments the server sends to keep proxies from timing out.
    pub fn parse(frame: &str) -> Option<Self> {
        let mut event_type = Self::DEFAULT_TYPE.to_string();
        let mut data: Option<String> = None;
        let mut id = None;
        let mut retry = None;

        for line in frame.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (key, value) = match line.split_once(':') {
                Some((key, value)) => (key, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match key {
                "event" => event_type = value.to_string(),
                "data" => match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                },
                "id" => id = Some(value.to_string()),
                "retry" => {
                    if let Ok(ms) = value.parse::<u64>() {
                        retry = Some(ms);
                    }
                }
                _ => trace!("Unknown SSE field: {}", key),
            }
        }

        let data = data?;
        Some(Self {
            event_type,
            data,
            id,
            retry,
        })
    }

    /// Whether this frame would reach an EventSource `onmessage` handler.
    pub fn is_message(&self) -> bool {
        self.event_type == Self::DEFAULT_TYPE
    }
}

/// Incremental frame splitter for a byte stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        // CRLF and LF line endings are both legal; normalise to LF.
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&frame[..end]);
            if let Some(event) = SseEvent::parse(&text) {
                events.push(event);
            }
        }
        events
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_data_only_frame_as_message() {
        let event = SseEvent::parse(r#"data: {"type":"connected"}"#).expect("frame has data");
        assert_eq!(event.event_type, "message");
        assert_eq!(event.data, r#"{"type":"connected"}"#);
        assert!(event.is_message());
    }

    #[test]
    fn joins_multi_line_data_and_reads_metadata() {
        let event = SseEvent::parse("event: update\nid: 7\nretry: 1500\ndata: a\ndata: b")
            .expect("frame has data");
        assert_eq!(event.event_type, "update");
        assert_eq!(event.data, "a\nb");
        assert_eq!(event.id.as_deref(), Some("7"));
        assert_eq!(event.retry, Some(1500));
        assert!(!event.is_message());
    }

    #[test]
    fn heartbeat_comments_produce_no_event() {
        assert_eq!(SseEvent::parse(": heartbeat"), None);
        assert_eq!(SseEvent::parse("id: 3"), None);
    }

    #[test]
    fn decoder_reassembles_frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"agent_").is_empty());
        let events = decoder.push(b"started\"}\n\n: heartbeat\n\ndata: {\"type\":\"x\"}\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, r#"{"type":"agent_started"}"#);

        let events = decoder.push(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, r#"{"type":"x"}"#);
    }

    #[test]
    fn decoder_handles_crlf_and_holds_unterminated_frames() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: one\r\n\r\ndata: two");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "one");

        // A frame cut off by the connection closing is never dispatched.
        assert!(decoder.push(b"").is_empty());
        let events = decoder.push(b"\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "two");
    }
}
