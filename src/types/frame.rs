//! Raw protocol frames

use std::time::Duration;

/// Event type assumed when a frame carries no `event` field
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One protocol unit as received on the wire
///
/// Frames are transient: they exist only between the frame decoder and the
/// event decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Declared event type (`"message"` when absent on the wire)
    pub event_type: String,

    /// Payload body; multiple `data:` lines are joined with `\n`.
    /// `None` when the frame declared an event but carried no `data` field.
    pub data: Option<String>,

    /// Last event id, when the server sends one
    pub id: Option<String>,

    /// Server-requested reconnection delay
    pub retry: Option<Duration>,
}

impl RawFrame {
    /// Build a frame with a type and payload
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self { event_type: event_type.into(), data: Some(data.into()), id: None, retry: None }
    }

    /// Payload text, empty when the frame had no `data` field
    pub fn payload(&self) -> &str {
        self.data.as_deref().unwrap_or_default()
    }
}
