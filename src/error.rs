//! Error types for the streaming client.
//!
//! Every fault the streaming core can observe is represented by [`StreamError`].
//! Errors are never allowed to terminate the process: the session driver uses
//! [`StreamError::is_retryable`] to decide between backing off and closing the
//! session for good.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: DNS/TCP failures, abrupt closes, liveness timeouts
//! - **HTTP Errors**: Non-success responses from the streaming endpoint
//! - **Authorization Errors**: The server rejected the bearer credential
//! - **Configuration Errors**: Invalid endpoints, bad settings files
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use mstdn::StreamError;
//!
//! let error = StreamError::connection_failed("connection reset by peer");
//! if error.is_retryable() {
//!     println!("Will reconnect");
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for streaming operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Failed to reach streaming endpoint: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Streaming endpoint answered with HTTP {status}")]
    Http { status: u16 },

    #[error("Credential rejected by server (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Invalid streaming endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("No frame received within liveness window of {window:?}")]
    LivenessTimeout { window: Duration },

    #[error("Stream ended without a clean frame boundary")]
    UnexpectedEof,

    #[error("Event stream line exceeded {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Session has already been started")]
    AlreadyStarted,

    #[error("Settings file error: {path}")]
    Settings {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StreamError {
    /// Returns whether the session should back off and reconnect after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Connection { .. } => true,
            StreamError::Http { .. } => true,
            StreamError::LivenessTimeout { .. } => true,
            StreamError::UnexpectedEof => true,
            StreamError::LineTooLong { .. } => true,
            StreamError::Unauthorized { .. } => false,
            StreamError::InvalidEndpoint { .. } => false,
            StreamError::Config { .. } => false,
            StreamError::AlreadyStarted => false,
            StreamError::Settings { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::Connection { .. } => vec![
                "Check network connectivity",
                "Verify the server name resolves",
                "Wait for the automatic reconnect",
            ],
            StreamError::Http { .. } => vec![
                "Check the instance status page",
                "Wait for the automatic reconnect",
            ],
            StreamError::Unauthorized { .. } => vec![
                "Re-authenticate to obtain a fresh access token",
                "Check the token has the read scope",
                "Start a new session once the credential is fixed",
            ],
            StreamError::InvalidEndpoint { .. } => vec![
                "Use an absolute http:// or https:// server URL",
                "Check the server setting for typos",
            ],
            StreamError::LivenessTimeout { .. } => vec![
                "Increase the liveness window",
                "Check for proxies that buffer event streams",
            ],
            StreamError::UnexpectedEof => vec![
                "Wait for the automatic reconnect",
                "Check for proxies that cut long-lived connections",
            ],
            StreamError::LineTooLong { .. } => vec![
                "Check the endpoint really serves an event stream",
                "Wait for the automatic reconnect",
            ],
            StreamError::Config { .. } => vec![
                "Check the stream configuration values",
                "Backoff and liveness durations must be non-zero",
            ],
            StreamError::AlreadyStarted => {
                vec!["Create a new session instead of restarting an existing one"]
            }
            StreamError::Settings { .. } => vec![
                "Check the settings file is valid JSON",
                "Check file permissions on the config directory",
            ],
        }
    }

    /// Helper constructor for transport errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        StreamError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Classify a non-success HTTP status from the streaming endpoint.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => StreamError::Unauthorized { status },
            _ => StreamError::Http { status },
        }
    }

    /// Helper constructor for endpoint validation errors.
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        StreamError::InvalidEndpoint { endpoint: endpoint.into(), reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        StreamError::Config { reason: reason.into() }
    }

    /// Helper constructor for settings file errors.
    pub fn settings(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        StreamError::Settings { path: path.into(), source: source.into() }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_connect() {
            "connect failed"
        } else if err.is_timeout() {
            "request timed out"
        } else if err.is_body() || err.is_decode() {
            "error reading event stream body"
        } else {
            "request failed"
        };
        StreamError::Connection { reason: reason.to_string(), source: Some(Box::new(err)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn status_classification_is_total(status in 100u16..600u16) {
            let error = StreamError::from_status(status);
            let fatal = status == 401 || status == 403;

            prop_assert_eq!(error.is_retryable(), !fatal);
            prop_assert!(error.to_string().contains(&status.to_string()));
            prop_assert!(!error.recovery_suggestions().is_empty());
          }

          #[test]
          fn messages_carry_their_context(
            reason in ".*",
            endpoint in "[a-z:/.]*",
            window_ms in 1u64..600_000u64
          ) {
            let connection = StreamError::connection_failed(reason.clone());
            let invalid = StreamError::invalid_endpoint(endpoint.clone(), reason.clone());
            let liveness = StreamError::LivenessTimeout { window: Duration::from_millis(window_ms) };

            prop_assert!(connection.to_string().contains(&reason));
            prop_assert!(invalid.to_string().contains(&endpoint));
            prop_assert!(!liveness.to_string().is_empty());
          }
        }
    }

    #[test]
    fn transient_and_fatal_errors_are_split() {
        assert!(StreamError::connection_failed("reset").is_retryable());
        assert!(StreamError::Http { status: 502 }.is_retryable());
        assert!(StreamError::UnexpectedEof.is_retryable());
        assert!(StreamError::LineTooLong { limit: 1024 }.is_retryable());
        assert!(
            StreamError::LivenessTimeout { window: Duration::from_secs(1) }.is_retryable()
        );

        assert!(!StreamError::Unauthorized { status: 401 }.is_retryable());
        assert!(!StreamError::invalid_endpoint("ftp://x", "bad scheme").is_retryable());
        assert!(!StreamError::config("zero capacity").is_retryable());
        assert!(!StreamError::AlreadyStarted.is_retryable());
    }

    #[test]
    fn forbidden_counts_as_unauthorized() {
        assert!(matches!(StreamError::from_status(403), StreamError::Unauthorized { status: 403 }));
        assert!(matches!(StreamError::from_status(429), StreamError::Http { status: 429 }));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<StreamError>();

        let error = StreamError::connection_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::other("socket closed");
        let error = StreamError::connection_failed_with_source("read failed", Box::new(io));
        let source = std::error::Error::source(&error).expect("source should be kept");
        assert_eq!(source.to_string(), "socket closed");
    }
}
