//! Pool error types.

use std::time::Duration;

use ora_auth::AuthError;
use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum PoolError {
    /// Invalid pool configuration.
    #[error("invalid pool configuration: {0}")]
    Config(String),

    /// Heterogeneous pools (per-acquire credentials) are not supported.
    #[error("heterogeneous pools are not supported in thin mode")]
    HeterogeneousUnsupported,

    /// Creating or using a connection failed.
    #[error(transparent)]
    Client(#[from] ora_client::Error),

    /// Credentials could not be resolved for a new connection.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The pool has been closed.
    #[error("connection pool is closed")]
    PoolClosed,

    /// No connection became available in time.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    AcquireTimeout(Duration),

    /// Connections are still checked out.
    #[error("pool has {0} busy connection(s)")]
    BusyConnections(usize),
}

impl PoolError {
    /// Whether retrying the operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Client(e) => e.is_transient(),
            Self::Auth(e) => matches!(e, AuthError::TokenExpired),
            Self::AcquireTimeout(_) => true,
            _ => false,
        }
    }
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
