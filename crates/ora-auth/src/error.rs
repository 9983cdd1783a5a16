//! Authentication error types.

use thiserror::Error;

/// Errors raised while resolving credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// Neither a password nor an access token was supplied.
    #[error("no credentials specified: a password or an access token is required")]
    MissingCredentials,

    /// The access token has expired and no refresh produced a valid one.
    #[error("access token has expired")]
    TokenExpired,

    /// The access token could not be parsed.
    #[error("invalid access token: {0}")]
    InvalidToken(String),

    /// The token provider failed.
    #[error("token provider failed: {0}")]
    Provider(String),

    /// An obfuscated secret could not be restored.
    #[error("stored secret is corrupted")]
    CorruptedSecret,
}
