//! Access tokens and token providers.
//!
//! Token based authentication (OAuth2, OCI IAM) hands the server a bearer
//! token instead of a password. Tokens expire; the expiry is read from the
//! JWT `exp` claim unless given explicitly.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::AuthError;
use crate::obfuscate::Secret;

/// A bearer token, optionally paired with the private key used for
/// proof-of-possession (IAM).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: Secret,
    private_key: Option<Secret>,
    expires_at: Option<SystemTime>,
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<u64>,
}

impl AccessToken {
    /// Create an OAuth2 style token. The expiry is taken from its JWT
    /// `exp` claim.
    pub fn new(token: &str) -> Result<Self, AuthError> {
        let expires_at = jwt_expiry(token)?;
        Ok(Self {
            token: Secret::new(token),
            private_key: None,
            expires_at,
        })
    }

    /// Create an IAM style token with its private key.
    pub fn with_private_key(token: &str, private_key: &str) -> Result<Self, AuthError> {
        let mut access = Self::new(token)?;
        access.private_key = Some(Secret::new(private_key));
        Ok(access)
    }

    /// Create a token with an explicit expiry, bypassing JWT parsing.
    #[must_use]
    pub fn with_expiry(token: &str, expires_at: SystemTime) -> Self {
        Self {
            token: Secret::new(token),
            private_key: None,
            expires_at: Some(expires_at),
        }
    }

    /// Expiry time, if known.
    #[must_use]
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Whether the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|exp| exp <= SystemTime::now())
    }

    /// Restore the clear-text token.
    pub fn reveal_token(&self) -> Result<String, AuthError> {
        self.token.reveal()
    }

    /// Restore the clear-text private key, if any.
    pub fn reveal_private_key(&self) -> Result<Option<String>, AuthError> {
        self.private_key.as_ref().map(Secret::reveal).transpose()
    }
}

/// Read the `exp` claim of a JWT.
///
/// Returns `Ok(None)` for a well-formed JWT without an `exp` claim.
fn jwt_expiry(token: &str) -> Result<Option<SystemTime>, AuthError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err(AuthError::InvalidToken("not a JWT".into())),
    };
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    let claims: Claims =
        serde_json::from_slice(&decoded).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    Ok(claims.exp.map(|secs| UNIX_EPOCH + Duration::from_secs(secs)))
}

/// Source of fresh access tokens.
///
/// `refresh` is `true` when the previously cached token has expired and the
/// provider must not hand back a cached copy of it.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a token.
    async fn access_token(&self, refresh: bool) -> Result<AccessToken, AuthError>;
}
