//! # ora-protocol
//!
//! Protocol-facing building blocks for the Oracle thin client.
//!
//! This crate does not implement the full TTC/TNS wire protocol. It defines
//! the vocabulary the resource-management layers speak when they hand work
//! to a transport:
//!
//! - [`message`]: outgoing requests, server responses and execute flags
//! - [`buffer`]: the outgoing request buffer with UB4 integer encoding,
//!   used for piggy-backed messages such as cursor closes
//! - [`types`]: bind values, variables and their metadata
//!
//! ## Example
//!
//! ```
//! use ora_protocol::buffer::{ReadBuffer, WriteBuffer};
//!
//! let mut buf = WriteBuffer::new();
//! buf.write_ub4(300);
//!
//! let bytes = buf.freeze();
//! let mut reader = ReadBuffer::new(&bytes);
//! assert_eq!(reader.read_ub4().unwrap(), 300);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod error;
pub mod message;
pub mod types;

pub use buffer::{ReadBuffer, WriteBuffer};
pub use error::ProtocolError;
pub use message::{ExecuteFlags, ExecuteRequest, Message, ReleaseMode, Request, Response};
pub use types::{BindDirection, OraType, Value, Variable};
