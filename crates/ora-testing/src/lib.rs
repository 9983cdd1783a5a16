//! # ora-testing
//!
//! Test infrastructure for the Oracle thin driver.
//!
//! [`MockConnector`] hands out scripted in-memory sessions. Tests program
//! connect failures, ping failures, server errors and session switches, and
//! inspect what each session received: requests, piggy-backed cursor
//! closes, pings and how it was disconnected.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ora_testing::{MockConnector, test_params};
//! use ora_client::Connection;
//!
//! let connector = MockConnector::new();
//! let conn = Connection::connect(&connector, &test_params()).await?;
//! conn.ping().await?;
//! assert_eq!(connector.session(0).unwrap().pings(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock;

pub use mock::{MockConnector, MockSession, MockSessionHandle, RecordedRequest};

use ora_auth::Credentials;
use ora_client::ConnectParams;

/// Connect parameters accepted by [`MockConnector`].
#[must_use]
pub fn test_params() -> ConnectParams {
    ConnectParams::new("localhost:1521/FREEPDB1", Credentials::password("scott", "tiger"))
}

/// Connect parameters for a DRCP pooled server.
#[must_use]
pub fn drcp_params() -> ConnectParams {
    ConnectParams::new(
        "localhost:1521/FREEPDB1:pooled",
        Credentials::password("scott", "tiger"),
    )
}
