//! Typed domain events

use serde::Serialize;

use super::{Notification, Status};

/// The typed representation of a frame meaningful to the application
///
/// The set of variants is closed; anything the decoder does not understand is
/// preserved in [`DomainEvent::Unknown`] rather than dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A newly published or boosted status
    StatusUpdate { status: Status },

    /// Mention, follow, favourite or boost alert
    Notification { notification: Notification },

    /// A status was deleted
    Deletion { status_id: String },

    /// Keep-alive signal; never delivered to subscribers
    Heartbeat,

    /// A frame with an unrecognized type or an undecodable payload
    Unknown { raw_type: String, raw_payload: String },
}

impl DomainEvent {
    /// Whether this event only feeds liveness bookkeeping
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, DomainEvent::Heartbeat)
    }

    /// Short name of the variant, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::StatusUpdate { .. } => "status_update",
            DomainEvent::Notification { .. } => "notification",
            DomainEvent::Deletion { .. } => "deletion",
            DomainEvent::Heartbeat => "heartbeat",
            DomainEvent::Unknown { .. } => "unknown",
        }
    }
}
