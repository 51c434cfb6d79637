use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Long-running operations that can observe the cancellation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelledOp {
    Connect,
    Sender,
    Receiver,
    Authorization,
}

impl CancelledOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Sender => "sender",
            Self::Receiver => "receiver",
            Self::Authorization => "authorization",
        }
    }
}

impl fmt::Display for CancelledOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to decode response: {0}")]
    DeserializationError(String),

    #[error("API error: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    /// The WebSocket handshake failed. `status` is the HTTP status the server
    /// answered the upgrade with, when it answered at all.
    #[error("Dial error {}: {message}", .status.unwrap_or_default())]
    DialError {
        status: Option<u16>,
        message: String,
    },

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Write deadline of {0:?} exceeded")]
    WriteTimeout(Duration),

    #[error("No frame received within {0:?}")]
    ReadTimeout(Duration),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("operation cancelled: {0}")]
    Cancelled(CancelledOp),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ExchangeError {
    /// Cancellation is reported on the done channel, never on the error sink.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_error_display_carries_status() {
        let err = ExchangeError::DialError {
            status: Some(403),
            message: "forbidden".to_string(),
        };
        assert_eq!(err.to_string(), "Dial error 403: forbidden");

        let err = ExchangeError::DialError {
            status: None,
            message: "refused".to_string(),
        };
        assert_eq!(err.to_string(), "Dial error 0: refused");
    }

    #[test]
    fn test_cancellation_is_distinguished() {
        let err = ExchangeError::Cancelled(CancelledOp::Receiver);
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "operation cancelled: receiver");
        assert!(!ExchangeError::ConnectionClosed.is_cancelled());
    }
}
