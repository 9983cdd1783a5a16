//! Client error types.

use ora_auth::AuthError;
use ora_protocol::ProtocolError;
use thiserror::Error;

/// Errors produced by connections and their statement caches.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid connection configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential or token failure.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Malformed protocol data.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport level failure (network, TLS, session loss).
    #[error("transport error: {0}")]
    Transport(String),

    /// Error reported by the database server.
    #[error("ORA-{code:05}: {message}")]
    Server {
        /// Server error number.
        code: u32,
        /// Server error message.
        message: String,
        /// Cursor the failing statement was bound to, `0` if none.
        cursor_id: u32,
    },

    /// Another operation is already running on this connection and
    /// concurrent use was configured to fail instead of queue.
    #[error("concurrent operations on a connection are disabled")]
    ConcurrentOperation,

    /// The connection has been closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// Wrong number of positional bind values.
    #[error("expected {expected} bind values, got {actual}")]
    BindCount {
        /// Number of bind placeholders in the statement.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A named bind value does not match any placeholder.
    #[error("unknown bind name: {0}")]
    UnknownBind(String),

    /// A broken internal invariant. Not recoverable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying on a new connection may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::ConnectionClosed => true,
            Self::Auth(e) => matches!(e, AuthError::TokenExpired),
            // ORA-03113 end-of-file on channel, ORA-03114 not connected,
            // ORA-12170/12541 connect timeout / no listener
            Self::Server { code, .. } => matches!(code, 3113 | 3114 | 12170 | 12541),
            _ => false,
        }
    }

    /// Whether the connection can no longer be used after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(_) | Self::ConnectionClosed | Self::Internal(_) => true,
            Self::Protocol(_) => true,
            Self::Server { code, .. } => matches!(code, 28 | 3113 | 3114),
            _ => false,
        }
    }

    /// Server error number, if this error came from the server.
    #[must_use]
    pub fn server_code(&self) -> Option<u32> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = Error::Server {
            code: 942,
            message: "table or view does not exist".into(),
            cursor_id: 3,
        };
        assert_eq!(err.to_string(), "ORA-00942: table or view does not exist");
        assert_eq!(err.server_code(), Some(942));
        assert!(!err.is_transient());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_classification() {
        assert!(Error::Transport("reset by peer".into()).is_transient());
        assert!(Error::Transport("reset by peer".into()).is_fatal());
        assert!(Error::Auth(AuthError::TokenExpired).is_transient());
        assert!(!Error::ConcurrentOperation.is_fatal());
        assert!(Error::Internal("double close".into()).is_fatal());
        let lost = Error::Server {
            code: 3113,
            message: "end-of-file on communication channel".into(),
            cursor_id: 0,
        };
        assert!(lost.is_transient() && lost.is_fatal());
    }
}
