//! Connection lifecycle state

use std::fmt;
use std::time::Duration;

/// Lifecycle state of a stream session
///
/// Written only by the session's control logic; consumers read snapshots or
/// watch updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Created but not started
    #[default]
    Idle,

    /// Opening a physical connection
    Connecting,

    /// Connected and reading frames
    Streaming,

    /// Waiting out a backoff delay before the next connection attempt
    Reconnecting {
        /// Consecutive failed attempts so far (starts at 1)
        attempt: u32,
        /// Jittered delay before the next attempt
        next_delay: Duration,
    },

    /// Terminal: stopped, or closed after a fatal error
    Closed,
}

impl ConnectionState {
    /// Whether the session has reached its terminal state
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => f.write_str("idle"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Streaming => f.write_str("streaming"),
            ConnectionState::Reconnecting { attempt, next_delay } => {
                write!(f, "reconnecting (attempt {attempt}, in {next_delay:?})")
            }
            ConnectionState::Closed => f.write_str("closed"),
        }
    }
}
