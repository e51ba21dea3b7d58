//! Line-oriented frame decoder
//!
//! Turns arbitrarily chunked bytes from the wire into [`RawFrame`]s. Partial
//! lines are buffered across calls to [`FrameDecoder::feed`], so the output
//! does not depend on where the transport happened to split the stream.

use bytes::BytesMut;
use std::time::Duration;
use tracing::trace;

use crate::types::{DEFAULT_EVENT_TYPE, RawFrame};
use crate::{Result, StreamError};

/// Longest line accepted before the connection is considered broken
pub const DEFAULT_MAX_LINE: usize = 1024 * 1024;

/// Item produced by the frame decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame closed by a blank line
    Frame(RawFrame),

    /// A comment line (`:thump`); carries no data but proves the peer is alive
    KeepAlive,
}

/// Fields collected for the frame under construction
#[derive(Debug, Default)]
struct PendingFrame {
    event: Option<String>,
    data: Option<String>,
    id: Option<String>,
    retry: Option<Duration>,
}

impl PendingFrame {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_none() && self.id.is_none() && self.retry.is_none()
    }

    fn push_data(&mut self, value: &str) {
        match &mut self.data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => self.data = Some(value.to_string()),
        }
    }

    /// Close the frame. Frames with neither a type nor a payload carry nothing
    /// to decode and are discarded.
    fn close(&mut self) -> Option<RawFrame> {
        let pending = std::mem::take(self);
        if pending.event.is_none() && pending.data.is_none() {
            return None;
        }

        Some(RawFrame {
            // An empty `event:` field selects the default type
            event_type: pending
                .event
                .filter(|event| !event.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            data: pending.data,
            id: pending.id,
            retry: pending.retry,
        })
    }
}

/// Incremental decoder for the event-stream wire format
///
/// One decoder belongs to one physical connection; call [`FrameDecoder::reset`]
/// (or build a new one) before feeding bytes from a new connection.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Bytes of the current, not yet terminated line
    buffer: BytesMut,

    /// Prefix of `buffer` already known to hold no newline
    scanned: usize,

    /// Upper bound on a single line, in bytes
    max_line: usize,

    /// Frame under construction
    pending: PendingFrame,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create an empty decoder accepting lines up to [`DEFAULT_MAX_LINE`]
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }

    /// Create an empty decoder with a custom line length limit
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
            max_line: max_line.max(1),
            pending: PendingFrame::default(),
        }
    }

    /// Feed one chunk of bytes and return every item it completes
    ///
    /// Fails with [`StreamError::LineTooLong`] once a line grows past the
    /// limit; the decoder is reset and the connection should be dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Decoded>> {
        self.buffer.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        loop {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buffer.len();
                break;
            };
            let newline_pos = self.scanned + offset;
            self.scanned = 0;
            if newline_pos > self.max_line {
                return Err(self.overflow());
            }

            let mut line_bytes = self.buffer.split_to(newline_pos + 1);
            line_bytes.truncate(line_bytes.len() - 1);
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.truncate(line_bytes.len() - 1);
            }

            let line = String::from_utf8_lossy(&line_bytes);
            if let Some(item) = self.process_line(&line) {
                decoded.push(item);
            }
        }

        if self.buffer.len() > self.max_line {
            return Err(self.overflow());
        }
        Ok(decoded)
    }

    fn overflow(&mut self) -> StreamError {
        trace!(buffered_bytes = self.buffer.len(), limit = self.max_line, "Line too long");
        self.reset();
        StreamError::LineTooLong { limit: self.max_line }
    }

    /// Signal end of stream.
    ///
    /// Any partially built frame or unterminated line is discarded, never
    /// emitted. Returns `true` when something had to be thrown away, meaning
    /// the stream ended without a clean frame boundary.
    pub fn finish(&mut self) -> bool {
        let dirty = self.has_partial();
        if dirty {
            trace!(
                buffered_bytes = self.buffer.len(),
                "Discarding partial frame at end of stream"
            );
        }
        self.reset();
        dirty
    }

    /// Drop all buffered state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.pending = PendingFrame::default();
    }

    /// Whether a frame or line is currently half-built
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty() || !self.pending.is_empty()
    }

    fn process_line(&mut self, line: &str) -> Option<Decoded> {
        if line.is_empty() {
            return self.pending.close().map(Decoded::Frame);
        }

        if line.starts_with(':') {
            return Some(Decoded::KeepAlive);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.push_data(value),
            "id" => self.pending.id = Some(value.to_string()),
            "retry" => match value.parse::<u64>() {
                Ok(millis) => self.pending.retry = Some(Duration::from_millis(millis)),
                Err(_) => trace!(value, "Ignoring non-numeric retry field"),
            },
            other => trace!(field = other, "Ignoring unrecognized field"),
        }
        None
    }
}
