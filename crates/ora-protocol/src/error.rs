//! Protocol-level error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol buffers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer data is truncated or incomplete.
    #[error("incomplete buffer: needed {needed} bytes, {available} available")]
    IncompleteBuffer {
        /// Bytes needed to decode the next value.
        needed: usize,
        /// Bytes remaining in the buffer.
        available: usize,
    },

    /// A UB4 length prefix outside the valid `0..=4` range.
    #[error("invalid UB4 length prefix: {0:#x}")]
    InvalidUb4Length(u8),

    /// Unknown message type in a piggy-back header.
    #[error("invalid message type: {0:#x}")]
    InvalidMessageType(u8),

    /// Unknown function code.
    #[error("unknown function code: {0}")]
    UnknownFunctionCode(u8),

    /// Unexpected end of stream.
    #[error("unexpected end of buffer")]
    UnexpectedEof,
}
