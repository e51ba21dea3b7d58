//! Replay provider serving scripted connections
//!
//! Used by tests and offline demos. Each call to [`Provider::open`] consumes
//! the next scripted connection in order.

use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace};
use url::Url;

use crate::config::Credential;
use crate::provider::{ByteStream, Provider};
use crate::{Result, StreamError};

/// One scripted connection attempt
#[derive(Debug)]
enum Script {
    /// Serve the chunks, then end the stream (peer closed)
    Ended(Vec<Bytes>),
    /// Serve the chunks, then keep the connection open without data
    Held(Vec<Bytes>),
    /// Serve the chunks, then fail mid-read
    Broken(Vec<Bytes>, StreamError),
    /// Fail to connect
    Refused(StreamError),
}

/// Provider that replays scripted connections
///
/// Once the script is exhausted, further `open` calls never complete, like a
/// server that accepts the connection but never answers.
#[derive(Debug, Default)]
pub struct ReplayProvider {
    script: VecDeque<Script>,
    opened: Arc<AtomicUsize>,
}

impl ReplayProvider {
    /// Create an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection that delivers `chunks` and then closes
    pub fn connection<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.script.push_back(Script::Ended(chunks.into_iter().map(Into::into).collect()));
        self
    }

    /// Connection that delivers `chunks` and then stays open and silent
    pub fn held_connection<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.script.push_back(Script::Held(chunks.into_iter().map(Into::into).collect()));
        self
    }

    /// Connection that delivers `chunks` and then fails with `error`
    pub fn broken_connection<I, B>(mut self, chunks: I, error: StreamError) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.script
            .push_back(Script::Broken(chunks.into_iter().map(Into::into).collect(), error));
        self
    }

    /// Connection attempt that fails with `error`
    pub fn failure(mut self, error: StreamError) -> Self {
        self.script.push_back(Script::Refused(error));
        self
    }

    /// Shared counter of `open` calls, readable after the provider moves into a session
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opened)
    }

    /// Scripted connections not yet consumed
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

fn chunk_stream(chunks: Vec<Bytes>) -> impl futures::Stream<Item = Result<Bytes>> + Send {
    stream::iter(chunks.into_iter().map(Ok))
}

#[async_trait::async_trait]
impl Provider for ReplayProvider {
    async fn open(&mut self, endpoint: &Url, _credential: &Credential) -> Result<ByteStream> {
        let attempt = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(attempt, endpoint = %endpoint, "Replay open");

        let Some(next) = self.script.pop_front() else {
            debug!("Replay script exhausted, holding connect attempt open");
            return futures::future::pending().await;
        };

        match next {
            Script::Ended(chunks) => Ok(chunk_stream(chunks).boxed()),
            Script::Held(chunks) => Ok(chunk_stream(chunks).chain(stream::pending()).boxed()),
            Script::Broken(chunks, error) => {
                Ok(chunk_stream(chunks).chain(stream::once(async move { Err(error) })).boxed())
            }
            Script::Refused(error) => Err(error),
        }
    }
}
