use tracing::warn;

use jejupost_types::events::StatusEvent;

/// Incremental reassembly of server-sent-event frames.
///
/// The byte stream arrives in chunks with no alignment to frame boundaries.
/// Complete frames end at a blank line (`\n\n`, or `\r\n\r\n` from servers
/// that emit CRLF); whatever trails the last delimiter stays buffered until
/// more bytes arrive. A frame is never dispatched early and the tail is
/// never discarded.
///
/// A frame whose payload is not valid JSON for a known status is logged and
/// skipped; decoding continues with the next frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for a frame delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed one chunk and drain every frame completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StatusEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((end, delim_len)) = find_delimiter(&self.buf) {
            let frame: Vec<u8> = self.buf.drain(..end + delim_len).collect();
            if let Some(event) = parse_frame(&frame[..end]) {
                events.push(event);
            }
        }
        events
    }
}

/// Locate the earliest frame delimiter: (offset, delimiter length).
fn find_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Extract and parse the `data:` payload of one complete frame.
///
/// Per the SSE format, multiple `data:` lines concatenate with a newline;
/// comment lines (leading `:`) and unknown fields are ignored. Returns
/// `None` for heartbeat frames with no data and for malformed payloads.
fn parse_frame(frame: &[u8]) -> Option<StatusEvent> {
    let text = match std::str::from_utf8(frame) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "dropping non-UTF-8 stream frame");
            return None;
        }
    };

    let mut payload = String::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !payload.is_empty() {
                payload.push('\n');
            }
            payload.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str::<StatusEvent>(&payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, payload = %payload, "dropping malformed status frame");
            None
        }
    }
}
