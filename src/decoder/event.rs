//! Frame to domain event mapping
//!
//! Decoding is total: every [`RawFrame`] produces exactly one [`DomainEvent`].
//! Payloads that cannot be decoded are preserved in [`DomainEvent::Unknown`]
//! with the raw text attached.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{DEFAULT_EVENT_TYPE, DomainEvent, Notification, RawFrame, Status};

/// Event type for new or boosted statuses
pub const UPDATE: &str = "update";
/// Event type for notifications
pub const NOTIFICATION: &str = "notification";
/// Event type for deleted statuses
pub const DELETE: &str = "delete";

/// Decode one frame into a domain event
pub fn decode_event(frame: &RawFrame) -> DomainEvent {
    let Some(payload) = frame.data.as_deref() else {
        debug!(event_type = %frame.event_type, "Frame declared a type but carried no payload");
        return unknown(frame);
    };

    if payload.contains('\n') {
        debug!(event_type = %frame.event_type, "Multi-line payload is not valid for this stream");
        return unknown(frame);
    }

    match frame.event_type.as_str() {
        UPDATE => match parse_json::<Status>(frame, payload) {
            Some(status) if !status.id.is_empty() => DomainEvent::StatusUpdate { status },
            _ => unknown(frame),
        },
        NOTIFICATION => match parse_json::<Notification>(frame, payload) {
            Some(notification) if !notification.id.is_empty() => {
                DomainEvent::Notification { notification }
            }
            _ => unknown(frame),
        },
        DELETE => {
            let status_id = payload.trim();
            if status_id.is_empty() {
                unknown(frame)
            } else {
                DomainEvent::Deletion { status_id: status_id.to_string() }
            }
        }
        DEFAULT_EVENT_TYPE if payload.trim().is_empty() => DomainEvent::Heartbeat,
        _ => unknown(frame),
    }
}

fn parse_json<T: DeserializeOwned>(frame: &RawFrame, payload: &str) -> Option<T> {
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(event_type = %frame.event_type, error = %e, "Undecodable payload");
            None
        }
    }
}

fn unknown(frame: &RawFrame) -> DomainEvent {
    DomainEvent::Unknown {
        raw_type: frame.event_type.clone(),
        raw_payload: frame.payload().to_string(),
    }
}
