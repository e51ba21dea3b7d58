//! Stream session: one logical subscription across many physical connections

use futures::Stream;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::StreamConfig;
use crate::dispatch::{DispatchSink, Subscription};
use crate::driver::{Driver, DriverContext, ErrorSlot, StateCell};
use crate::provider::Provider;
use crate::types::ConnectionState;
use crate::{Result, StreamError};

#[cfg(test)]
mod tests;

/// Owns the connection lifecycle for one stream endpoint
///
/// A session starts `Idle`, runs a driver task after [`StreamSession::start`],
/// and ends `Closed` after [`StreamSession::stop`] or a fatal error. Sessions
/// are independent: two sessions never share connections, state or queues.
///
/// # Example
///
/// ```rust,no_run
/// use mstdn::{Credential, HttpProvider, StreamConfig, StreamSession, Timeline};
///
/// # #[tokio::main]
/// # async fn main() -> mstdn::Result<()> {
/// let endpoint = Timeline::User.endpoint("https://mstdn.jp")?;
/// let config = StreamConfig::builder(endpoint, Credential::new("token")).build()?;
///
/// let mut session = StreamSession::new(config, HttpProvider::new()?);
/// let mut events = session.subscribe();
/// session.start()?;
///
/// while let Some(event) = events.next().await {
///     println!("{}", event.kind());
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamSession<P: Provider> {
    config: StreamConfig,

    /// Moved into the driver task on start
    provider: Option<P>,

    state: StateCell,
    sink: DispatchSink,
    last_error: ErrorSlot,

    /// Cancels the driver and, through child tokens, every subscription
    cancel: CancellationToken,

    task: Option<JoinHandle<()>>,
    jitter_seed: Option<u64>,
}

impl<P: Provider> StreamSession<P> {
    /// Create an idle session
    pub fn new(config: StreamConfig, provider: P) -> Self {
        let cancel = CancellationToken::new();
        let sink = DispatchSink::with_token(config.queue_capacity, cancel.child_token());

        Self {
            config,
            provider: Some(provider),
            state: StateCell::new(),
            sink,
            last_error: Arc::new(Mutex::new(None)),
            cancel,
            task: None,
            jitter_seed: None,
        }
    }

    /// Use a fixed seed for backoff jitter, making delays reproducible
    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }

    /// Start streaming: `Idle` → `Connecting`
    ///
    /// Must be called from within a Tokio runtime. A session starts at most
    /// once; to retry after a fatal error, build a new session.
    pub fn start(&mut self) -> Result<()> {
        if self.state.get() != ConnectionState::Idle {
            return Err(StreamError::AlreadyStarted);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| StreamError::config("start() must be called within a Tokio runtime"))?;
        let provider = self.provider.take().ok_or(StreamError::AlreadyStarted)?;

        info!(endpoint = %self.config.endpoint, "Starting stream session");
        self.state.set(ConnectionState::Connecting);

        let ctx = DriverContext::new(
            &self.config,
            self.state.clone(),
            self.sink.clone(),
            Arc::clone(&self.last_error),
            self.cancel.clone(),
            self.jitter_seed,
        );
        self.task = Some(Driver::spawn(&runtime, provider, ctx));
        Ok(())
    }

    /// Stop the session; idempotent and safe to call from any context
    ///
    /// Cancels the read loop and any pending reconnect, closes every
    /// subscription, and leaves the state `Closed`. No event is delivered after
    /// this returns.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!(endpoint = %self.config.endpoint, "Stopping stream session");
        }
        self.cancel.cancel();
        self.sink.close();
        self.state.set(ConnectionState::Closed);
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Stream of state changes, starting with the current state
    pub fn state_updates(&self) -> impl Stream<Item = ConnectionState> + Send + 'static {
        WatchStream::new(self.state.watch())
    }

    /// Wait until the state satisfies `predicate`, returning that state
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> ConnectionState
    where
        F: FnMut(&ConnectionState) -> bool,
    {
        let mut watcher = self.state.watch();
        match watcher.wait_for(|state| predicate(state)).await {
            Ok(state) => *state,
            Err(_) => self.state.get(),
        }
    }

    /// Wait until the session is closed
    pub async fn closed(&self) {
        self.wait_for_state(ConnectionState::is_closed).await;
    }

    /// Register a subscriber; allowed before `start` so no event is missed
    pub fn subscribe(&self) -> Subscription {
        self.sink.subscribe()
    }

    /// Most recent connection error, transient or fatal
    pub fn last_error(&self) -> Option<Arc<StreamError>> {
        self.last_error.lock().clone()
    }

    /// Configuration this session was built with
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Wait for the driver task to exit after `stop` or a fatal error
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Driver task did not exit cleanly");
            }
        }
    }
}

impl<P: Provider> Drop for StreamSession<P> {
    fn drop(&mut self) {
        debug!("Dropping stream session");
        // Cancel tasks on drop for clean shutdown
        self.stop();
    }
}
