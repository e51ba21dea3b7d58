//! Session lifecycle tests
//!
//! These drive full sessions against scripted providers with Tokio's clock
//! paused, so backoff and liveness timers elapse instantly and in order.

use super::*;
use crate::backoff::Backoff;
use crate::config::Credential;
use crate::provider::ByteStream;
use crate::providers::ReplayProvider;
use crate::types::{DomainEvent, Status};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::atomic::Ordering;
use std::time::Duration;
use url::Url;

const ENDPOINT: &str = "https://example.social/api/v1/streaming/user";

fn config() -> StreamConfig {
    StreamConfig::builder(ENDPOINT, Credential::new("token"))
        .base_backoff(Duration::from_millis(100))
        .max_backoff(Duration::from_secs(1))
        .liveness_window(Duration::from_secs(5))
        .queue_capacity(16)
        .build()
        .expect("valid config")
}

fn status(id: &str) -> DomainEvent {
    DomainEvent::StatusUpdate { status: Status { id: id.into(), ..Status::default() } }
}

fn deletion(id: &str) -> DomainEvent {
    DomainEvent::Deletion { status_id: id.into() }
}

/// Collect `count` reconnect states as the driver passes through them
fn collect_reconnects<P: Provider>(
    session: &StreamSession<P>,
    count: usize,
) -> tokio::task::JoinHandle<Vec<(u32, Duration)>> {
    let updates = session.state_updates();
    tokio::spawn(async move {
        updates
            .filter_map(|state| async move {
                match state {
                    ConnectionState::Reconnecting { attempt, next_delay } => {
                        Some((attempt, next_delay))
                    }
                    _ => None,
                }
            })
            .take(count)
            .collect()
            .await
    })
}

#[tokio::test(start_paused = true)]
async fn update_delete_and_comment_scenario() {
    let provider = ReplayProvider::new().held_connection([
        "event: update\ndata: {\"id\":\"1\"}\n\n",
        "event: delete\ndata: 1\n\n",
        ":keepalive\n\n",
    ]);
    let mut session = StreamSession::new(config(), provider);
    let mut subscription = session.subscribe();
    session.start().expect("start");

    assert_eq!(subscription.next().await, Some(status("1")));
    assert_eq!(subscription.next().await, Some(deletion("1")));
    assert_eq!(session.state(), ConnectionState::Streaming);
    assert!(subscription.try_next().is_none());
}

#[tokio::test(start_paused = true)]
async fn stop_closes_subscribers_and_state() {
    let provider = ReplayProvider::new().held_connection(Vec::<Bytes>::new());
    let mut session = StreamSession::new(config(), provider);
    let mut subscription = session.subscribe();
    session.start().expect("start");

    session.wait_for_state(|state| *state == ConnectionState::Streaming).await;
    let reader = tokio::spawn(async move { subscription.next().await });
    tokio::task::yield_now().await;

    session.stop();
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(reader.await.expect("join"), None);

    // Idempotent
    session.stop();
    session.join().await;
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn no_events_after_stop() {
    let provider = ReplayProvider::new().held_connection(["event: delete\ndata: 1\n\n"]);
    let mut session = StreamSession::new(config(), provider);
    let mut subscription = session.subscribe();
    session.start().expect("start");

    session.wait_for_state(|state| *state == ConnectionState::Streaming).await;
    tokio::task::yield_now().await;

    session.stop();
    assert_eq!(subscription.next().await, None);
    assert_eq!(session.subscribe().next().await, None);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_closes_without_retrying() {
    let provider = ReplayProvider::new()
        .failure(StreamError::Unauthorized { status: 401 })
        .held_connection(["event: delete\ndata: 1\n\n"]);
    let opened = provider.open_counter();
    let mut session = StreamSession::new(config(), provider);
    let mut subscription = session.subscribe();
    session.start().expect("start");

    session.closed().await;
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert!(matches!(
        session.last_error().as_deref(),
        Some(StreamError::Unauthorized { status: 401 })
    ));
    assert_eq!(subscription.next().await, None);
    assert!(matches!(session.start(), Err(StreamError::AlreadyStarted)));
}

#[tokio::test(start_paused = true)]
async fn reconnects_with_bounded_backoff() {
    let provider = ReplayProvider::new()
        .failure(StreamError::connection_failed("refused"))
        .failure(StreamError::Http { status: 502 })
        .failure(StreamError::connection_failed("refused"))
        .held_connection(["event: delete\ndata: 9\n\n"]);
    let opened = provider.open_counter();
    let mut session = StreamSession::new(config(), provider).with_jitter_seed(42);
    let mut subscription = session.subscribe();
    let reconnects = collect_reconnects(&session, 3);
    session.start().expect("start");

    assert_eq!(subscription.next().await, Some(deletion("9")));
    assert_eq!(opened.load(Ordering::SeqCst), 4);

    let reconnects = reconnects.await.expect("join");
    let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
    let attempts: Vec<u32> = reconnects.iter().map(|(attempt, _)| *attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    for (attempt, delay) in reconnects {
        assert!(delay <= backoff.computed_delay(attempt), "attempt {attempt}: {delay:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn healthy_connection_resets_attempts() {
    let provider = ReplayProvider::new()
        .failure(StreamError::connection_failed("refused"))
        .failure(StreamError::connection_failed("refused"))
        .connection(["event: delete\ndata: 1\n\n"])
        .failure(StreamError::connection_failed("refused"));
    let mut session = StreamSession::new(config(), provider).with_jitter_seed(7);
    let _subscription = session.subscribe();
    let reconnects = collect_reconnects(&session, 4);
    session.start().expect("start");

    let attempts: Vec<u32> =
        reconnects.await.expect("join").into_iter().map(|(attempt, _)| attempt).collect();
    assert_eq!(attempts, vec![1, 2, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn silent_connection_hits_liveness_window() {
    let provider = ReplayProvider::new()
        .held_connection(Vec::<Bytes>::new())
        .held_connection(["event: delete\ndata: 2\n\n"]);
    let opened = provider.open_counter();
    let mut session = StreamSession::new(config(), provider);
    let mut subscription = session.subscribe();
    session.start().expect("start");

    assert_eq!(subscription.next().await, Some(deletion("2")));
    assert_eq!(opened.load(Ordering::SeqCst), 2);
    assert!(matches!(
        session.last_error().as_deref(),
        Some(StreamError::LivenessTimeout { .. })
    ));
}

/// Provider that refuses `leading_failures` times, then opens one connection
/// emitting a chunk every `interval`; any later open is rejected as unauthorized
struct PacedProvider {
    leading_failures: usize,
    chunks: Vec<&'static str>,
    interval: Duration,
    hold_open: bool,
    opened: usize,
}

impl PacedProvider {
    fn new(chunks: Vec<&'static str>, interval: Duration) -> Self {
        Self { leading_failures: 0, chunks, interval, hold_open: true, opened: 0 }
    }
}

#[async_trait::async_trait]
impl Provider for PacedProvider {
    async fn open(&mut self, _endpoint: &Url, _credential: &Credential) -> crate::Result<ByteStream> {
        self.opened += 1;
        if self.opened <= self.leading_failures {
            return Err(StreamError::connection_failed("refused"));
        }
        if self.opened > self.leading_failures + 1 {
            return Err(StreamError::Unauthorized { status: 401 });
        }

        let interval = self.interval;
        let chunks = std::mem::take(&mut self.chunks);
        let paced = futures::stream::iter(chunks).then(move |chunk| async move {
            tokio::time::sleep(interval).await;
            Ok::<_, StreamError>(Bytes::from_static(chunk.as_bytes()))
        });
        if self.hold_open {
            Ok(paced.chain(futures::stream::pending()).boxed())
        } else {
            Ok(paced.boxed())
        }
    }
}

#[tokio::test(start_paused = true)]
async fn heartbeats_keep_connection_alive_but_are_not_delivered() {
    // Liveness window is 5s; the feed stays silent except for heartbeats for 30s.
    // A second open would fail fatally, so any reconnect closes the session.
    let mut chunks = Vec::new();
    for _ in 0..5 {
        chunks.push("data:\n\n");
        chunks.push(":thump\n");
    }
    chunks.push("event: delete\ndata: 3\n\n");

    let provider = PacedProvider::new(chunks, Duration::from_secs(3));
    let mut session = StreamSession::new(config(), provider);
    let mut subscription = session.subscribe();
    session.start().expect("start");

    assert_eq!(subscription.next().await, Some(deletion("3")));
    assert_eq!(session.state(), ConnectionState::Streaming);
    assert!(session.last_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn sustained_connection_resets_attempts_without_events() {
    // Heartbeats only, spanning 12s against a 5s liveness window, then a clean close
    let chunks = vec!["data:\n\n", ":thump\n", "data:\n\n", ":thump\n"];
    let provider = PacedProvider {
        leading_failures: 2,
        hold_open: false,
        ..PacedProvider::new(chunks, Duration::from_secs(3))
    };
    let mut session = StreamSession::new(config(), provider).with_jitter_seed(3);
    let _subscription = session.subscribe();
    let reconnects = collect_reconnects(&session, 3);
    session.start().expect("start");

    let attempts: Vec<u32> =
        reconnects.await.expect("join").into_iter().map(|(attempt, _)| attempt).collect();
    assert_eq!(attempts, vec![1, 2, 1]);
}

#[tokio::test(start_paused = true)]
async fn broken_frame_is_dropped_not_corrupted() {
    let provider = ReplayProvider::new()
        .broken_connection(
            ["event: update\ndata: {\"id\":\"1\"}\n"],
            StreamError::connection_failed("reset by peer"),
        )
        .connection(["event: update\ndata: {\"id\":\"2\"}"])
        .held_connection(["event: delete\ndata: 5\n\n"]);
    let mut session = StreamSession::new(config(), provider);
    let mut subscription = session.subscribe();
    session.start().expect("start");

    assert_eq!(subscription.next().await, Some(deletion("5")));
    assert!(subscription.try_next().is_none());
}

#[tokio::test(start_paused = true)]
async fn truncated_stream_reports_unexpected_eof() {
    let provider = ReplayProvider::new().connection(["event: update\ndata: {\"id\":\"2\"}\n"]);
    let mut session = StreamSession::new(config(), provider);
    let _subscription = session.subscribe();
    session.start().expect("start");

    session
        .wait_for_state(|state| matches!(state, ConnectionState::Reconnecting { .. }))
        .await;
    assert!(matches!(session.last_error().as_deref(), Some(StreamError::UnexpectedEof)));
}

#[tokio::test(start_paused = true)]
async fn stop_during_backoff_prevents_reconnect() {
    let provider = ReplayProvider::new()
        .failure(StreamError::connection_failed("refused"))
        .held_connection(["event: delete\ndata: 1\n\n"]);
    let opened = provider.open_counter();
    let mut session = StreamSession::new(config(), provider);
    session.start().expect("start");

    session
        .wait_for_state(|state| matches!(state, ConnectionState::Reconnecting { .. }))
        .await;
    session.stop();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn stop_abandons_pending_connect() {
    // An exhausted script never answers the connect attempt
    let provider = ReplayProvider::new();
    let opened = provider.open_counter();
    let mut session = StreamSession::new(config(), provider);
    session.start().expect("start");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    session.stop();
    tokio::time::timeout(Duration::from_secs(1), session.join()).await.expect("driver exits");
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unanswered_connect_is_retried_after_liveness_window() {
    let provider = ReplayProvider::new();
    let opened = provider.open_counter();
    let mut session = StreamSession::new(config(), provider);
    session.start().expect("start");

    let state = session
        .wait_for_state(|state| matches!(state, ConnectionState::Reconnecting { .. }))
        .await;
    assert!(matches!(state, ConnectionState::Reconnecting { attempt: 1, .. }));
    assert!(matches!(session.last_error().as_deref(), Some(StreamError::Connection { .. })));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(opened.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn sessions_are_independent() {
    let first = ReplayProvider::new().held_connection(["event: delete\ndata: a\n\n"]);
    let second = ReplayProvider::new().held_connection(["event: delete\ndata: b\n\n"]);

    let mut one = StreamSession::new(config(), first);
    let mut two = StreamSession::new(config(), second);
    let mut one_events = one.subscribe();
    let mut two_events = two.subscribe();
    one.start().expect("start one");
    two.start().expect("start two");

    assert_eq!(one_events.next().await, Some(deletion("a")));
    assert_eq!(two_events.next().await, Some(deletion("b")));

    one.stop();
    assert_eq!(one.state(), ConnectionState::Closed);
    assert_eq!(two.state(), ConnectionState::Streaming);
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let mut session = StreamSession::new(config(), ReplayProvider::new());
    session.start().expect("start");
    assert!(matches!(session.start(), Err(StreamError::AlreadyStarted)));
}

#[test]
fn start_outside_runtime_is_an_error() {
    let mut session = StreamSession::new(config(), ReplayProvider::new());
    assert!(matches!(session.start(), Err(StreamError::Config { .. })));
    assert_eq!(session.state(), ConnectionState::Idle);
}
