//! Incremental `text/event-stream` parser.
//!
//! Bytes are buffered until a full line is available. Lines end in CR, LF or
//! CRLF; a CR at the very end of the buffer waits for the next chunk in case
//! it is the first half of a CRLF pair.

use core::str::Utf8Error;

use bytes::{Buf, BytesMut};

use crate::types::{DEFAULT_EVENT_TYPE, StreamEvent};

const LF: u8 = b'\n';
const CR: u8 = b'\r';
const BOM: &[u8] = "\u{FEFF}".as_bytes();

/// Parses a byte stream into [`StreamEvent`]s.
#[derive(Debug, Default)]
pub(crate) struct EventParser {
    buffer: BytesMut,
    started: bool,
    event_type: String,
    data: Option<String>,
    last_event_id: String,
}

impl EventParser {
    /// Resume with the id seen on a previous connection.
    pub(crate) fn with_last_event_id(last_event_id: Option<String>) -> Self {
        Self {
            last_event_id: last_event_id.unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Feed a chunk and return every event it completes.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, Utf8Error> {
        self.buffer.extend_from_slice(chunk);

        if !self.started {
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                return Ok(Vec::new());
            }
            if self.buffer.starts_with(BOM) {
                self.buffer.advance(BOM.len());
            }
            self.started = true;
        }

        let mut events = Vec::new();
        while let Some((line_end, rest_start)) = find_eol(&self.buffer) {
            let line = self.buffer.split_to(line_end);
            self.buffer.advance(rest_start - line_end);
            let line = core::str::from_utf8(&line)?;
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// The id carried by the most recent `id` field, if any.
    pub(crate) fn last_event_id(&self) -> Option<&str> {
        (!self.last_event_id.is_empty()).then_some(self.last_event_id.as_str())
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = value.to_string(),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "id" if !value.contains('\0') => self.last_event_id = value.to_string(),
            // `retry` is governed by the client's own retry policy.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamEvent> {
        let event_type = core::mem::take(&mut self.event_type);
        let data = self.data.take()?;

        let event_type = if event_type.is_empty() {
            DEFAULT_EVENT_TYPE.to_string()
        } else {
            event_type
        };

        let mut event = StreamEvent::new(event_type, data);
        if let Some(id) = self.last_event_id() {
            event = event.with_id(id);
        }
        Some(event)
    }
}

/// Returns `(line_end, rest_start)`, or `None` if more data is needed.
fn find_eol(bytes: &[u8]) -> Option<(usize, usize)> {
    let pos = memchr::memchr2(CR, LF, bytes)?;
    if bytes[pos] == LF {
        return Some((pos, pos + 1));
    }
    match bytes.get(pos + 1) {
        None => None,
        Some(&LF) => Some((pos, pos + 2)),
        Some(_) => Some((pos, pos + 1)),
    }
}
