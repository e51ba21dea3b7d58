//! Driver task owning the connect / read / reconnect loop

use futures::StreamExt;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::backoff::Backoff;
use crate::config::{Credential, StreamConfig};
use crate::decoder::{Decoded, FrameDecoder, decode_event};
use crate::dispatch::DispatchSink;
use crate::provider::{ByteStream, Provider};
use crate::types::ConnectionState;
use crate::StreamError;

/// Shared cell holding the session's [`ConnectionState`]
///
/// `Closed` is terminal: once written, later writes are ignored.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<watch::Sender<ConnectionState>>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(watch::Sender::new(ConnectionState::Idle)))
    }

    /// Apply a transition; returns whether the state changed
    pub(crate) fn set(&self, next: ConnectionState) -> bool {
        self.0.send_if_modified(|current| {
            if current.is_closed() || *current == next {
                return false;
            }
            trace!(from = %current, to = %next, "State transition");
            *current = next;
            true
        })
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.0.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.0.subscribe()
    }
}

/// Slot holding the most recent connection error
pub(crate) type ErrorSlot = Arc<Mutex<Option<Arc<StreamError>>>>;

/// Everything the driver task needs, moved into it at spawn time
pub(crate) struct DriverContext {
    pub(crate) endpoint: Url,
    pub(crate) credential: Credential,
    pub(crate) backoff: Backoff,
    pub(crate) liveness_window: Duration,
    pub(crate) state: StateCell,
    pub(crate) sink: DispatchSink,
    pub(crate) last_error: ErrorSlot,
    pub(crate) cancel: CancellationToken,
    pub(crate) rng: StdRng,
}

impl DriverContext {
    pub(crate) fn new(
        config: &StreamConfig,
        state: StateCell,
        sink: DispatchSink,
        last_error: ErrorSlot,
        cancel: CancellationToken,
        jitter_seed: Option<u64>,
    ) -> Self {
        let rng = match jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            endpoint: config.endpoint.clone(),
            credential: config.credential.clone(),
            backoff: Backoff::new(config.base_backoff, config.max_backoff),
            liveness_window: config.liveness_window,
            state,
            sink,
            last_error,
            cancel,
            rng,
        }
    }

    fn record_error(&self, error: StreamError) {
        *self.last_error.lock() = Some(Arc::new(error));
    }
}

/// How one physical connection ended
enum Disconnect {
    /// The session was stopped
    Cancelled,
    /// The connection was lost and may be retried
    Lost(StreamError),
}

/// Bookkeeping carried across connections
#[derive(Debug, Default)]
struct Progress {
    /// Consecutive failed attempts
    attempt: u32,
    /// Physical connections opened
    connections: u64,
    /// Events published to the sink
    delivered: u64,
}

/// Driver spawns and runs the session loop
///
/// The driver task is the only writer of the decoder buffer and the only
/// publisher into the sink. Cancellation of the context token interrupts any
/// of its waits: connecting, reading, or backing off. A connect attempt that
/// gets no response within the liveness window counts as a transient failure.
pub(crate) struct Driver;

impl Driver {
    /// Spawn the driver task for the given provider
    pub(crate) fn spawn<P>(
        runtime: &tokio::runtime::Handle,
        provider: P,
        ctx: DriverContext,
    ) -> JoinHandle<()>
    where
        P: Provider,
    {
        runtime.spawn(async move {
            Self::run(provider, ctx).await;
        })
    }

    async fn run<P>(mut provider: P, mut ctx: DriverContext)
    where
        P: Provider,
    {
        info!(endpoint = %ctx.endpoint, "Stream driver started");
        let mut progress = Progress::default();

        loop {
            if ctx.cancel.is_cancelled() {
                break;
            }
            ctx.state.set(ConnectionState::Connecting);

            let opened = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    debug!("Stream driver cancelled while connecting");
                    break;
                }
                opened = tokio::time::timeout(
                    ctx.liveness_window,
                    provider.open(&ctx.endpoint, &ctx.credential),
                ) => match opened {
                    Ok(opened) => opened,
                    Err(_) => Err(StreamError::connection_failed(format!(
                        "no response within {:?}",
                        ctx.liveness_window
                    ))),
                },
            };

            let failure = match opened {
                Ok(body) => {
                    progress.connections += 1;
                    ctx.state.set(ConnectionState::Streaming);
                    info!(connection = progress.connections, "Event stream connected");

                    match Self::pump(body, &ctx, &mut progress).await {
                        Disconnect::Cancelled => {
                            debug!("Stream driver cancelled while streaming");
                            break;
                        }
                        Disconnect::Lost(error) => error,
                    }
                }
                Err(error) => error,
            };

            if !failure.is_retryable() {
                error!(error = %failure, "Fatal stream error, closing session");
                ctx.record_error(failure);
                ctx.sink.close();
                ctx.state.set(ConnectionState::Closed);
                break;
            }

            progress.attempt = progress.attempt.saturating_add(1);
            let delay = ctx.backoff.jittered_delay(progress.attempt, &mut ctx.rng);
            warn!(
                error = %failure,
                attempt = progress.attempt,
                delay_ms = delay.as_millis() as u64,
                "Event stream lost, reconnecting"
            );
            ctx.record_error(failure);
            ctx.state.set(ConnectionState::Reconnecting { attempt: progress.attempt, next_delay: delay });

            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    debug!("Stream driver cancelled during backoff");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        ctx.state.set(ConnectionState::Closed);
        info!(
            connections = progress.connections,
            delivered = progress.delivered,
            "Stream driver ended"
        );
    }

    /// Read one physical connection until it ends, fails, stalls or is cancelled
    async fn pump(mut body: ByteStream, ctx: &DriverContext, progress: &mut Progress) -> Disconnect {
        let window = ctx.liveness_window;
        let connected_at = Instant::now();
        let mut decoder = FrameDecoder::new();
        let mut healthy = false;

        let liveness = tokio::time::sleep(window);
        tokio::pin!(liveness);

        loop {
            let chunk = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Disconnect::Cancelled,
                _ = &mut liveness => {
                    return Disconnect::Lost(StreamError::LivenessTimeout { window });
                }
                chunk = body.next() => chunk,
            };

            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(error)) => return Disconnect::Lost(error),
                None => {
                    let error = if decoder.finish() {
                        StreamError::UnexpectedEof
                    } else {
                        StreamError::connection_failed("server closed the event stream")
                    };
                    return Disconnect::Lost(error);
                }
            };

            let items = match decoder.feed(&bytes) {
                Ok(items) => items,
                Err(error) => return Disconnect::Lost(error),
            };
            for item in items {
                if ctx.cancel.is_cancelled() {
                    return Disconnect::Cancelled;
                }
                liveness.as_mut().reset(Instant::now() + window);

                let frame = match item {
                    Decoded::KeepAlive => {
                        trace!("Keep-alive");
                        continue;
                    }
                    Decoded::Frame(frame) => frame,
                };
                if let Some(retry) = frame.retry {
                    debug!(retry_ms = retry.as_millis() as u64, "Server suggested retry delay");
                }

                let event = decode_event(&frame);
                if event.is_heartbeat() {
                    trace!("Heartbeat");
                    continue;
                }

                trace!(kind = event.kind(), "Publishing event");
                ctx.sink.publish(event);
                progress.delivered += 1;
                healthy = true;
            }

            if !healthy && connected_at.elapsed() >= window {
                healthy = true;
            }
            if healthy && progress.attempt != 0 {
                debug!(after_attempts = progress.attempt, "Connection healthy, backoff reset");
                progress.attempt = 0;
            }
        }
    }
}
