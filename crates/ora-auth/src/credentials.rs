//! Connection credentials.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::AuthError;
use crate::obfuscate::Secret;
use crate::token::{AccessToken, TokenProvider};

/// Credentials used to authenticate a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Database user. Not required for token authentication.
    pub user: Option<String>,
    password: Option<Secret>,
    token: Option<AccessToken>,
}

impl Credentials {
    /// Username/password credentials.
    #[must_use]
    pub fn password(user: impl Into<String>, password: &str) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(Secret::new(password)),
            token: None,
        }
    }

    /// Token credentials.
    #[must_use]
    pub fn token(token: AccessToken) -> Self {
        Self {
            user: None,
            password: None,
            token: Some(token),
        }
    }

    /// Set the user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password.
    #[must_use]
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(Secret::new(password));
        self
    }

    /// Check that some form of authentication is present.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.password.is_none() && self.token.is_none() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(())
    }

    /// Restore the clear-text password, if any.
    pub fn reveal_password(&self) -> Result<Option<String>, AuthError> {
        self.password.as_ref().map(Secret::reveal).transpose()
    }

    /// The access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    /// Whether token authentication is used.
    #[must_use]
    pub fn uses_token(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) fn set_token(&mut self, token: AccessToken) {
        self.token = Some(token);
    }
}

/// Resolves the credentials to use for each new connection.
///
/// Holds the current credentials and an optional [`TokenProvider`]. When the
/// cached token has expired the provider is asked for a new one with
/// `refresh = true`; a replacement that is itself expired is rejected.
#[derive(Clone)]
pub struct CredentialSource {
    current: Arc<Mutex<Credentials>>,
    provider: Option<Arc<dyn TokenProvider>>,
}

impl CredentialSource {
    /// Create a source over fixed credentials.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            current: Arc::new(Mutex::new(credentials)),
            provider: None,
        }
    }

    /// Attach a token provider used for refresh.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Whether a token provider is configured.
    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Replace the cached access token.
    pub fn set_access_token(&self, token: AccessToken) {
        self.current.lock().set_token(token);
    }

    /// Validate the cached credentials without refreshing.
    pub fn validate(&self) -> Result<(), AuthError> {
        self.current.lock().validate()
    }

    /// Return the credentials to connect with, refreshing an expired token.
    pub async fn current(&self) -> Result<Credentials, AuthError> {
        let credentials = self.current.lock().clone();
        let expired = credentials
            .access_token()
            .is_some_and(AccessToken::is_expired);
        if !expired {
            return Ok(credentials);
        }

        let provider = self.provider.as_ref().ok_or(AuthError::TokenExpired)?;
        tracing::debug!("access token expired, requesting refresh");
        let token = provider.access_token(true).await?;
        if token.is_expired() {
            tracing::warn!("token provider returned an expired token");
            return Err(AuthError::TokenExpired);
        }

        let mut current = self.current.lock();
        current.set_token(token);
        Ok(current.clone())
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSource")
            .field("user", &self.current.lock().user)
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}
