//! Error types for the realtime transport.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type alias for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

/// Errors that can occur while talking to the realtime service.
///
/// None of these reach subscribers: the connection task logs them and
/// reconnects.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Project URL could not be parsed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Project URL parsed but cannot be turned into a socket URL
    #[error("Unsupported project URL: {0}")]
    UnsupportedUrl(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server closed the socket
    #[error("Connection closed by server")]
    Closed,

    /// Heartbeat went unanswered for a full interval
    #[error("Heartbeat not acknowledged within {0:?}")]
    HeartbeatTimeout(Duration),

    /// Frame that does not follow the channel protocol
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl RealtimeError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<tungstenite::Error> for RealtimeError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}
