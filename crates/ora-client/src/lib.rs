//! # ora-client
//!
//! Connection core of the Oracle thin driver.
//!
//! This crate manages what lives on a single connection: the server
//! session, the per-connection statement cache and the operation lock that
//! keeps one round trip in flight at a time. The network layer is reached
//! through the [`Connector`] and [`Session`] traits.
//!
//! ## Features
//!
//! - **Statement cache**: exact LRU over parsed statements; cursors of
//!   evicted statements are closed with the next request
//! - **Re-execute**: unchanged bind shapes skip the parse round trip
//! - **Single-flight lock**: FIFO queueing, or an immediate error when
//!   `error_on_concurrent_execute` is set
//! - **DRCP aware**: session release on close and cursor reset when the
//!   server hands over a different session
//!
//! ## Example
//!
//! ```rust,ignore
//! use ora_client::{ConnectParams, Connection, Query};
//!
//! let params = ConnectParams::from_connection_string(
//!     "user=hr;password=welcome;connect_string=dbhost/orclpdb",
//! )?;
//! let conn = Connection::connect(&connector, &params).await?;
//!
//! let result = conn
//!     .execute(Query::new("select last_name from employees where id = :id").bind(101))
//!     .await?;
//! println!("{:?}", result.rows);
//!
//! conn.close().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod instrumentation;
pub mod lock;
mod parser;
pub mod query;
pub mod statement;
pub mod transport;

pub use cache::StatementCache;
pub use config::{ConnectDescriptor, ConnectParams, Purity, ServerType};
pub use connection::Connection;
pub use error::{Error, Result};
pub use lock::{OperationGuard, OperationLock};
pub use ora_auth::Credentials;
pub use ora_protocol::{BindDirection, OraType, Value, Variable};
pub use query::{Query, QueryResult};
pub use statement::{BindInfo, Statement, StatementId, StatementKind};
pub use transport::{Connector, DisconnectMode, Session};
