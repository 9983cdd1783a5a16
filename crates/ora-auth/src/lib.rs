//! # ora-auth
//!
//! Authentication material for Oracle thin connections.
//!
//! ## Features
//!
//! - Password and token credentials kept obfuscated in memory
//! - OAuth2 / IAM access tokens with JWT expiry detection
//! - Pluggable [`TokenProvider`] invoked to refresh expired tokens
//! - [`CredentialSource`] that resolves current credentials before each
//!   new connection
//!
//! Obfuscation is a reversible XOR mask. It keeps secrets out of plain-text
//! memory dumps; it is not encryption.
//!
//! ## Example
//!
//! ```rust
//! use ora_auth::Credentials;
//!
//! let creds = Credentials::password("scott", "tiger");
//! assert!(creds.validate().is_ok());
//! assert_eq!(creds.reveal_password().unwrap().as_deref(), Some("tiger"));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod credentials;
pub mod error;
pub mod obfuscate;
pub mod token;

pub use credentials::{CredentialSource, Credentials};
pub use error::AuthError;
pub use obfuscate::Secret;
pub use token::{AccessToken, TokenProvider};
