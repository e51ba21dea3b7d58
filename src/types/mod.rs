//! Core types for the streaming client.
//!
//! ## Architecture
//!
//! - [`RawFrame`] is one protocol unit as read from the wire
//! - [`DomainEvent`] is the closed, typed form a frame decodes into
//! - [`Status`], [`Notification`] and [`Account`] are the REST entities
//!   carried inside event payloads
//! - [`ConnectionState`] describes where a session is in its lifecycle
//!
//! ## Usage Example
//!
//! ```rust
//! use mstdn::types::{DomainEvent, RawFrame};
//! use mstdn::decoder::decode_event;
//!
//! let frame = RawFrame::new("delete", "108");
//! assert_eq!(decode_event(&frame), DomainEvent::Deletion { status_id: "108".into() });
//! ```

mod entities;
mod event;
mod frame;
mod state;

pub use entities::{Account, Notification, NotificationKind, Status, Visibility};
pub use event::DomainEvent;
pub use frame::{DEFAULT_EVENT_TYPE, RawFrame};
pub use state::ConnectionState;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn domain_events_serialize_with_tag() {
        let event = DomainEvent::Deletion { status_id: "42".into() };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "deletion");
        assert_eq!(json["status_id"], "42");
    }

    #[test]
    fn heartbeat_is_flagged() {
        assert!(DomainEvent::Heartbeat.is_heartbeat());
        assert!(!DomainEvent::Deletion { status_id: "1".into() }.is_heartbeat());
    }

    #[test]
    fn state_display() {
        let state = ConnectionState::Reconnecting { attempt: 2, next_delay: Duration::from_secs(1) };
        assert_eq!(state.to_string(), "reconnecting (attempt 2, in 1s)");
        assert!(ConnectionState::Closed.is_closed());
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }

    #[test]
    fn frame_payload_defaults_to_empty() {
        let frame = RawFrame { data: None, ..RawFrame::new("update", "") };
        assert_eq!(frame.payload(), "");
    }
}
