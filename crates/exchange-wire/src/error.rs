//! Error types for the wire layer.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the exchange.
#[derive(Error, Debug)]
pub enum WireError {
    /// The TCP connection could not be established.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connection was not established in time.
    #[error("Timed out connecting to {addr} after {after:?}")]
    ConnectTimeout { addr: String, after: Duration },

    /// Writing the framed request failed.
    #[error("Failed to write request: {0}")]
    Write(#[source] std::io::Error),

    /// Reading the response failed.
    #[error("Failed to read response: {0}")]
    Read(#[source] std::io::Error),

    /// No complete response arrived before the deadline.
    #[error("No complete response within {0:?}")]
    Timeout(Duration),

    /// The peer closed the stream before the response was complete.
    #[error("Connection closed after {received} response bytes, before the response was complete")]
    Closed { received: usize },

    /// The response bytes cannot form a valid response. `consumed` says
    /// whether the whole malformed frame was read off the stream.
    #[error("Malformed response: {reason}")]
    Framing { reason: String, consumed: bool },
}

/// Coarse classification of a [`WireError`], used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connect,
    Write,
    Read,
    Timeout,
    Closed,
    Framing,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connect => "connect",
            ErrorKind::Write => "write",
            ErrorKind::Read => "read",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Closed => "closed",
            ErrorKind::Framing => "framing",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WireError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WireError::Connect { .. } | WireError::ConnectTimeout { .. } => ErrorKind::Connect,
            WireError::Write(_) => ErrorKind::Write,
            WireError::Read(_) => ErrorKind::Read,
            WireError::Timeout(_) => ErrorKind::Timeout,
            WireError::Closed { .. } => ErrorKind::Closed,
            WireError::Framing { .. } => ErrorKind::Framing,
        }
    }

    /// Whether the connection must be discarded after this error.
    ///
    /// After a timeout, a broken stream or a framing error that stopped
    /// mid-frame, unread response bytes may still arrive and would be taken
    /// for the next response. Only a malformed frame that was read to its
    /// end leaves the stream position known.
    pub fn poisons_connection(&self) -> bool {
        !matches!(self, WireError::Framing { consumed: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let timeout = WireError::Timeout(Duration::from_secs(1));
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert!(timeout.poisons_connection());

        let framing = WireError::Framing {
            reason: "bad".to_string(),
            consumed: true,
        };
        assert_eq!(framing.kind().as_str(), "framing");
        assert_eq!(framing.to_string(), "Malformed response: bad");
        assert!(!framing.poisons_connection());

        let partial = WireError::Framing {
            reason: "too long".to_string(),
            consumed: false,
        };
        assert_eq!(partial.kind(), ErrorKind::Framing);
        assert!(partial.poisons_connection());

        let closed = WireError::Closed { received: 3 };
        assert_eq!(closed.kind(), ErrorKind::Closed);
        assert!(closed.to_string().contains("3 response bytes"));
    }

    #[test]
    fn test_connect_error_message() {
        let err = WireError::Connect {
            addr: "127.0.0.1:12345".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert!(err.to_string().starts_with("Failed to connect to 127.0.0.1:12345"));
    }
}
