//! Outgoing requests and server responses.
//!
//! A [`Message`] is what the client core hands to a transport session: the
//! function call itself plus any piggy-backed calls (cursor closes) that must
//! travel in the same round trip.

use bitflags::bitflags;
use bytes::Bytes;

use crate::types::{Value, Variable};

/// Message type byte that introduces a piggy-backed function call.
pub const MSG_TYPE_PIGGYBACK: u8 = 17;

/// TTC function codes.
pub mod function {
    /// Log off the session.
    pub const LOGOFF: u8 = 9;
    /// Commit the current transaction.
    pub const COMMIT: u8 = 14;
    /// Roll back the current transaction.
    pub const ROLLBACK: u8 = 15;
    /// Re-execute an already parsed cursor.
    pub const REEXECUTE: u8 = 4;
    /// Re-execute and fetch.
    pub const REEXECUTE_AND_FETCH: u8 = 78;
    /// Parse/bind/execute.
    pub const EXECUTE: u8 = 94;
    /// Close cursors (piggy-back only).
    pub const CLOSE_CURSORS: u8 = 105;
    /// Round-trip ping.
    pub const PING: u8 = 147;
    /// Release a DRCP session.
    pub const SESSION_RELEASE: u8 = 163;
}

bitflags! {
    /// Options sent with an execute call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExecuteFlags: u32 {
        /// Parse the SQL text.
        const PARSE = 0x01;
        /// Bind variables are included.
        const BIND = 0x08;
        /// Column defines are included.
        const DEFINE = 0x10;
        /// Execute the statement.
        const EXECUTE = 0x20;
        /// Fetch rows.
        const FETCH = 0x40;
        /// Commit after execute.
        const COMMIT = 0x100;
        /// PL/SQL bind semantics.
        const PLSQL_BIND = 0x400;
        /// Return DML row counts.
        const DML_ROWCOUNTS = 0x4000;
        /// The statement is not PL/SQL.
        const NOT_PLSQL = 0x8000;
        /// Describe only.
        const DESCRIBE = 0x20000;
    }
}

/// DRCP session release mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ReleaseMode {
    /// Return the session to the server-side pool.
    #[default]
    Normal = 0,
    /// Return the session and drop its authentication.
    Deauthenticate = 0x0000_0002,
}

/// Parameters of an execute call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteRequest {
    /// Server cursor id, `0` when the statement has not been parsed yet.
    pub cursor_id: u32,
    /// SQL text, present only when the server must parse it.
    pub sql: Option<String>,
    /// Execute options.
    pub flags: ExecuteFlags,
    /// Bind variables in declared order.
    pub binds: Vec<Variable>,
    /// Number of rows to prefetch for queries.
    pub prefetch_rows: u32,
    /// Send full bind and define metadata instead of re-executing the
    /// cursor as previously described.
    pub full_execute: bool,
}

impl ExecuteRequest {
    /// Whether this call re-executes an existing cursor.
    #[must_use]
    pub fn is_reexecute(&self) -> bool {
        self.cursor_id != 0 && !self.full_execute && !self.flags.contains(ExecuteFlags::PARSE)
    }
}

impl Default for ExecuteFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// A function call sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Execute (or re-execute) a statement.
    Execute(ExecuteRequest),
    /// Round-trip ping.
    Ping,
    /// Commit the transaction.
    Commit,
    /// Roll back the transaction.
    Rollback,
    /// Log off the session.
    Logoff,
    /// Release a DRCP session.
    SessionRelease {
        /// Release mode.
        mode: ReleaseMode,
    },
}

impl Request {
    /// TTC function code for this request.
    #[must_use]
    pub fn function_code(&self) -> u8 {
        match self {
            Self::Execute(req) if req.is_reexecute() => {
                if req.flags.contains(ExecuteFlags::FETCH) {
                    function::REEXECUTE_AND_FETCH
                } else {
                    function::REEXECUTE
                }
            }
            Self::Execute(_) => function::EXECUTE,
            Self::Ping => function::PING,
            Self::Commit => function::COMMIT,
            Self::Rollback => function::ROLLBACK,
            Self::Logoff => function::LOGOFF,
            Self::SessionRelease { .. } => function::SESSION_RELEASE,
        }
    }

    /// Short operation name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Execute(_) => "execute",
            Self::Ping => "ping",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Logoff => "logoff",
            Self::SessionRelease { .. } => "session_release",
        }
    }
}

/// A request together with its piggy-backed calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Encoded piggy-backs, empty if none.
    pub piggybacks: Bytes,
    /// The main function call.
    pub request: Request,
}

impl Message {
    /// Create a message without piggy-backs.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            piggybacks: Bytes::new(),
            request,
        }
    }

    /// Attach encoded piggy-backs.
    #[must_use]
    pub fn with_piggybacks(mut self, piggybacks: Bytes) -> Self {
        self.piggybacks = piggybacks;
        self
    }
}

/// Server response to a [`Message`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// Cursor id assigned to (or kept by) the executed statement.
    pub cursor_id: u32,
    /// Number of columns described for a query.
    pub num_columns: u32,
    /// Fetched rows.
    pub rows: Vec<Vec<Value>>,
    /// Rows affected by DML.
    pub rows_affected: u64,
    /// Values returned for OUT binds, in bind order.
    pub out_values: Vec<Value>,
    /// Success-with-info warning.
    pub warning: Option<String>,
    /// Whether a transaction is open after this call.
    pub txn_in_progress: bool,
    /// Whether the physical server session changed underneath the logical
    /// connection (DRCP session hand-off).
    pub session_switched: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_codes() {
        assert_eq!(Request::Ping.function_code(), function::PING);
        assert_eq!(Request::Commit.function_code(), function::COMMIT);
        assert_eq!(
            Request::SessionRelease {
                mode: ReleaseMode::Deauthenticate
            }
            .function_code(),
            function::SESSION_RELEASE
        );
    }

    #[test]
    fn test_execute_vs_reexecute() {
        let parse = ExecuteRequest {
            cursor_id: 0,
            sql: Some("select 1 from dual".into()),
            flags: ExecuteFlags::PARSE | ExecuteFlags::EXECUTE | ExecuteFlags::FETCH,
            full_execute: true,
            ..Default::default()
        };
        assert_eq!(Request::Execute(parse).function_code(), function::EXECUTE);

        // changed bind metadata forces a full execute of the existing cursor
        let rebind = ExecuteRequest {
            cursor_id: 12,
            flags: ExecuteFlags::EXECUTE | ExecuteFlags::BIND,
            full_execute: true,
            ..Default::default()
        };
        assert!(!rebind.is_reexecute());
        assert_eq!(Request::Execute(rebind).function_code(), function::EXECUTE);

        let reexec = ExecuteRequest {
            cursor_id: 12,
            flags: ExecuteFlags::EXECUTE | ExecuteFlags::FETCH,
            ..Default::default()
        };
        assert!(reexec.is_reexecute());
        assert_eq!(
            Request::Execute(reexec).function_code(),
            function::REEXECUTE_AND_FETCH
        );
    }

    #[test]
    fn test_release_mode_values() {
        assert_eq!(ReleaseMode::Normal as u32, 0);
        assert_eq!(ReleaseMode::Deauthenticate as u32, 2);
    }
}
