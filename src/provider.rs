//! Provider trait for event-stream transports

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use url::Url;

use crate::Result;
use crate::config::Credential;

/// Raw byte chunks of one physical connection
///
/// The stream ending (`None`) means the peer closed the connection; an `Err`
/// item means the transport failed mid-read.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Trait for event-stream transports
///
/// Providers abstract over where bytes come from (HTTP, scripted replay) and
/// know nothing about frames or reconnection. The session driver owns its
/// provider and calls [`Provider::open`] once per physical connection.
#[async_trait::async_trait]
pub trait Provider: Send + 'static {
    /// Open one connection to `endpoint` authenticated by `credential`
    ///
    /// Returns:
    /// - `Ok(stream)` - Connected; the server accepted the request
    /// - `Err(e)` - Connection failed; [`crate::StreamError::is_retryable`]
    ///   decides whether the session backs off or closes
    async fn open(&mut self, endpoint: &Url, credential: &Credential) -> Result<ByteStream>;
}
