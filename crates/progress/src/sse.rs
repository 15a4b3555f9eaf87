//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary chunks; [`EventStreamDecoder::feed`] buffers
//! partial lines and returns the `data` payload of every event completed by
//! the chunk. Only the `data` field is surfaced. Comment lines (the
//! publisher's `: keepalive`) and the `event`, `id` and `retry` fields are
//! consumed silently.

const BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    /// Bytes of the current, not yet terminated line.
    pending: Vec<u8>,
    /// Accumulated `data` lines of the event being built.
    data: Option<String>,
    /// Whether the leading byte-order mark has been checked for.
    started: bool,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of the body and return the payloads of all events
    /// it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        if !self.started {
            if self.pending.len() < BOM.len() && BOM.starts_with(&self.pending) {
                return Vec::new();
            }
            if self.pending.starts_with(BOM) {
                self.pending.drain(..BOM.len());
            }
            self.started = true;
        }

        let mut events = Vec::new();
        let mut consumed = 0;

        while let Some(offset) = self.pending[consumed..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
        {
            let end = consumed + offset;
            let terminator = self.pending[end];

            // A trailing CR may be the first half of CRLF; wait for more input.
            if terminator == b'\r' && end + 1 == self.pending.len() {
                break;
            }

            let line = String::from_utf8_lossy(&self.pending[consumed..end]).into_owned();
            consumed = if terminator == b'\r' && self.pending[end + 1] == b'\n' {
                end + 2
            } else {
                end + 1
            };

            if let Some(payload) = self.process_line(&line) {
                events.push(payload);
            }
        }

        self.pending.drain(..consumed);
        events
    }

    /// Handle one complete line; returns a payload when the line dispatches
    /// an event.
    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.data.take();
        }
        if line.starts_with(':') {
            tracing::trace!(comment = %line, "Event stream comment");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "event" | "id" | "retry" => {}
            other => tracing::trace!(field = %other, "Ignoring unknown event stream field"),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_event() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder.feed(b"data: {\"status\":\"processing\"}\n\n");
        assert_eq!(events, vec![r#"{"status":"processing"}"#.to_string()]);
    }

    #[test]
    fn keepalive_comments_produce_nothing() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(b": keepalive\n\n").is_empty());
    }

    #[test]
    fn event_split_across_chunks() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(b"da").is_empty());
        assert!(decoder.feed(b"ta: {\"a\":").is_empty());
        assert!(decoder.feed(b"1}\n").is_empty());
        assert_eq!(decoder.feed(b"\n"), vec![r#"{"a":1}"#.to_string()]);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let mut decoder = EventStreamDecoder::new();
        let text = "data: Übersicht\n\n".as_bytes();
        // Split inside the two-byte encoding of 'Ü'.
        assert!(decoder.feed(&text[..7]).is_empty());
        assert_eq!(decoder.feed(&text[7..]), vec!["Übersicht".to_string()]);
    }

    #[test]
    fn crlf_and_cr_line_endings() {
        let mut decoder = EventStreamDecoder::new();
        assert_eq!(decoder.feed(b"data: one\r\n\r\n"), vec!["one".to_string()]);
        assert_eq!(decoder.feed(b"data: two\r\r\n"), vec!["two".to_string()]);
    }

    #[test]
    fn crlf_split_between_chunks() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(b"data: x\r").is_empty());
        assert!(decoder.feed(b"\n\r").is_empty());
        assert_eq!(decoder.feed(b"\n"), vec!["x".to_string()]);
    }

    #[test]
    fn multiple_data_lines_are_joined() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder.feed(b"data: first\ndata: second\n\n");
        assert_eq!(events, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn several_events_in_one_chunk() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder.feed(b"data: 1\n\n: keepalive\n\nevent: progress\nid: 7\ndata: 2\n\n");
        assert_eq!(events, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn blank_line_without_data_dispatches_nothing() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(b"event: ping\n\n\n").is_empty());
    }

    #[test]
    fn field_without_space_after_colon() {
        let mut decoder = EventStreamDecoder::new();
        assert_eq!(decoder.feed(b"data:tight\n\n"), vec!["tight".to_string()]);
    }

    #[test]
    fn leading_byte_order_mark_is_skipped() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(b"\xEF\xBB").is_empty());
        assert_eq!(decoder.feed(b"\xBFdata: x\n\n"), vec!["x".to_string()]);
    }

    #[test]
    fn unterminated_event_is_not_dispatched() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(b"data: partial\n").is_empty());
    }
}
