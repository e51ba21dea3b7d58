//! Mastodon client library with a resilient streaming event core.
//!
//! The heart of the crate is [`StreamSession`]: it holds one logical
//! subscription to a server's event stream across any number of physical
//! connections, decodes the line-oriented wire protocol into typed
//! [`DomainEvent`]s, and fans them out to independent subscribers.
//!
//! # Features
//!
//! - **Total decoding**: every frame becomes exactly one event; undecodable
//!   payloads surface as [`DomainEvent::Unknown`] instead of errors
//! - **Reconnection**: exponential backoff with full jitter, reset once a
//!   connection proves healthy
//! - **Liveness**: silent connections are detected and replaced
//! - **Lossy backpressure**: slow subscribers drop their oldest events rather
//!   than stalling ingestion
//!
//! ## Example
//!
//! ```rust,no_run
//! use mstdn::{Credential, HttpProvider, StreamConfig, StreamSession, Timeline};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = Timeline::Public.endpoint("https://mstdn.jp")?;
//!     let config = StreamConfig::builder(endpoint, Credential::new("token")).build()?;
//!
//!     let mut session = StreamSession::new(config, HttpProvider::new()?);
//!     let mut events = Box::pin(session.subscribe().into_stream());
//!     session.start()?;
//!
//!     while let Some(event) = events.next().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire protocol
pub mod decoder;

// Session architecture
pub mod backoff;
pub mod config;
pub mod dispatch;
mod driver;
pub mod provider;
pub mod providers;
pub mod session;

// Core exports
pub use error::*;
pub use types::*;

pub use config::{ClientSettings, Credential, StreamConfig, StreamConfigBuilder, Timeline};
pub use dispatch::{DispatchSink, Subscription};
pub use provider::{ByteStream, Provider};
pub use providers::{HttpProvider, ReplayProvider};
pub use session::StreamSession;

/// Unified entry point for stream sessions.
///
/// Builds HTTP-backed sessions for a server and timeline in one call.
///
/// # Example
///
/// ```rust,no_run
/// use mstdn::{Mstdn, Timeline};
///
/// #[tokio::main]
/// async fn main() -> mstdn::Result<()> {
///     let mut session = Mstdn::stream("https://mstdn.jp", "token", Timeline::User)?;
///     let mut events = session.subscribe();
///     session.start()?;
///     while let Some(event) = events.next().await {
///         println!("{}", event.kind());
///     }
///     Ok(())
/// }
/// ```
pub struct Mstdn;

impl Mstdn {
    /// Create an idle HTTP session with default tuning.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `server` is not an absolute URL
    /// - the HTTP client cannot be built
    pub fn stream(
        server: &str,
        access_token: &str,
        timeline: Timeline,
    ) -> Result<StreamSession<HttpProvider>> {
        let endpoint = timeline.endpoint(server)?;
        let config = StreamConfig::builder(endpoint, Credential::new(access_token)).build()?;
        Ok(StreamSession::new(config, HttpProvider::new()?))
    }
}
