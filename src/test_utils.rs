//! Test utilities for building wire fixtures
//!
//! Helpers for turning domain events back into event-stream text and for
//! splitting that text the way a transport might, shared by unit tests,
//! integration tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use bytes::Bytes;

use crate::decoder::event::{DELETE, NOTIFICATION, UPDATE};
use crate::types::{Account, DEFAULT_EVENT_TYPE, DomainEvent, Notification, NotificationKind, Status};

/// Status fixture with an author and some content
pub fn sample_status(id: &str) -> Status {
    Status {
        id: id.to_string(),
        uri: format!("https://example.social/users/alice/statuses/{id}"),
        url: Some(format!("https://example.social/@alice/{id}")),
        account: sample_account("1", "alice"),
        content: format!("<p>status {id}</p>"),
        ..Status::default()
    }
}

/// Account fixture
pub fn sample_account(id: &str, acct: &str) -> Account {
    Account {
        id: id.to_string(),
        username: acct.to_string(),
        acct: acct.to_string(),
        display_name: acct.to_uppercase(),
        ..Account::default()
    }
}

/// Mention notification fixture wrapping [`sample_status`]
pub fn sample_notification(id: &str) -> Notification {
    Notification {
        id: id.to_string(),
        kind: NotificationKind::Mention,
        account: sample_account("2", "bob"),
        status: Some(sample_status(id)),
        ..Notification::default()
    }
}

/// Encode an event as the server would send it, including the closing blank line
///
/// Heartbeats encode as an empty `message` frame.
pub fn encode_event(event: &DomainEvent) -> String {
    match event {
        DomainEvent::StatusUpdate { status } => encode_frame(UPDATE, &to_json(status)),
        DomainEvent::Notification { notification } => {
            encode_frame(NOTIFICATION, &to_json(notification))
        }
        DomainEvent::Deletion { status_id } => encode_frame(DELETE, status_id),
        DomainEvent::Heartbeat => encode_frame(DEFAULT_EVENT_TYPE, ""),
        DomainEvent::Unknown { raw_type, raw_payload } => encode_frame(raw_type, raw_payload),
    }
}

/// Encode one frame; multi-line payloads become one `data:` line each
pub fn encode_frame(event_type: &str, payload: &str) -> String {
    let mut out = format!("event: {event_type}\n");
    for line in payload.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Split `text` into chunks of at most `size` bytes, ignoring UTF-8 boundaries
pub fn split_into_chunks(text: &str, size: usize) -> Vec<Bytes> {
    text.as_bytes().chunks(size.max(1)).map(Bytes::copy_from_slice).collect()
}

/// A realistic feed: statuses, deletions and notifications separated by keep-alives
pub fn sample_feed(events: usize) -> String {
    let mut feed = String::new();
    for i in 0..events {
        let id = i.to_string();
        let event = match i % 3 {
            0 => DomainEvent::StatusUpdate { status: sample_status(&id) },
            1 => DomainEvent::Deletion { status_id: id },
            _ => DomainEvent::Notification { notification: sample_notification(&id) },
        };
        feed.push_str(&encode_event(&event));
        if i % 10 == 9 {
            feed.push_str(":thump\n");
        }
    }
    feed
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    // Entities are plain data with string keys; serialization cannot fail.
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Decoded, FrameDecoder, decode_event};

    fn decode_all(chunks: &[Bytes]) -> Vec<DomainEvent> {
        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            for item in decoder.feed(chunk).expect("line within limit") {
                if let Decoded::Frame(frame) = item {
                    events.push(decode_event(&frame));
                }
            }
        }
        assert!(!decoder.finish(), "feed should end on a frame boundary");
        events
    }

    #[test]
    fn encoded_events_decode_back() {
        let events = vec![
            DomainEvent::StatusUpdate { status: sample_status("1") },
            DomainEvent::Notification { notification: sample_notification("2") },
            DomainEvent::Deletion { status_id: "3".into() },
            DomainEvent::Heartbeat,
            DomainEvent::Unknown { raw_type: "filters_changed".into(), raw_payload: String::new() },
        ];

        let wire: String = events.iter().map(encode_event).collect();
        assert_eq!(decode_all(&split_into_chunks(&wire, 7)), events);
    }

    #[test]
    fn sample_feed_has_expected_shape() {
        let feed = sample_feed(30);
        let events = decode_all(&[Bytes::from(feed)]);

        assert_eq!(events.len(), 30);
        assert!(events.iter().all(|event| !matches!(event, DomainEvent::Unknown { .. })));
    }

    #[test]
    fn chunking_preserves_bytes() {
        let chunks = split_into_chunks("abcdef", 4);
        assert_eq!(chunks, vec![Bytes::from_static(b"abcd"), Bytes::from_static(b"ef")]);
    }
}
