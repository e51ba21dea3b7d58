//! HTTP provider backed by reqwest

use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, HeaderValue};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Credential;
use crate::provider::{ByteStream, Provider};
use crate::{Result, StreamError};

const EVENT_STREAM: &str = "text/event-stream";

/// Provider that opens the streaming endpoint over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
}

impl HttpProvider {
    /// Create a provider with a fresh client
    ///
    /// Only the connect phase is bounded; the response body is read for as
    /// long as the server keeps it open.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("mstdn/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StreamError::connection_failed_with_source("building HTTP client", Box::new(e)))?;
        Ok(Self { client })
    }

    /// Create a provider sharing an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Provider for HttpProvider {
    async fn open(&mut self, endpoint: &Url, credential: &Credential) -> Result<ByteStream> {
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(StreamError::invalid_endpoint(
                endpoint.as_str(),
                format!("unsupported scheme '{}'", endpoint.scheme()),
            ));
        }

        debug!(endpoint = %endpoint, "Opening event stream");
        let response = self
            .client
            .get(endpoint.clone())
            .bearer_auth(credential.expose())
            .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM))
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), endpoint = %endpoint, "Event stream request rejected");
            return Err(StreamError::from_status(status.as_u16()));
        }

        match response.headers().get(reqwest::header::CONTENT_TYPE) {
            Some(content_type) if !content_type.as_bytes().starts_with(EVENT_STREAM.as_bytes()) => {
                warn!(?content_type, "Unexpected content type on event stream");
            }
            _ => {}
        }

        info!(status = status.as_u16(), endpoint = %endpoint, "Event stream opened");
        Ok(response.bytes_stream().map(|chunk| chunk.map_err(StreamError::from)).boxed())
    }
}
