//! Outgoing request buffer and the matching reader.
//!
//! Integers in TTC payloads are mostly written in the variable-length UB4
//! form: a single length byte followed by the significant big-endian bytes
//! of the value. Zero is written as a lone `0` length byte.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::message::{MSG_TYPE_PIGGYBACK, function};

/// Buffer used to serialize an outgoing request.
#[derive(Debug, Default, Clone)]
pub struct WriteBuffer {
    buf: BytesMut,
}

impl WriteBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    /// Write an unsigned 32-bit integer in UB4 form.
    pub fn write_ub4(&mut self, value: u32) {
        if value == 0 {
            self.buf.put_u8(0);
            return;
        }
        let bytes = value.to_be_bytes();
        let skip = (value.leading_zeros() / 8) as usize;
        self.buf.put_u8((4 - skip) as u8);
        self.buf.put_slice(&bytes[skip..]);
    }

    /// Write the header that precedes a piggy-backed function call.
    pub fn write_piggyback_header(&mut self, function_code: u8) {
        self.buf.put_u8(MSG_TYPE_PIGGYBACK);
        self.buf.put_u8(function_code);
        // sequence number, assigned by the transport
        self.buf.put_u8(0);
    }

    /// Write the piggy-back header and pointer byte that open a
    /// close-cursors call. The caller follows with the UB4 count and ids.
    pub fn write_close_cursors_header(&mut self) {
        self.write_piggyback_header(function::CLOSE_CURSORS);
        self.write_u8(1);
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the buffer and return the written bytes.
    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over an encoded buffer.
#[derive(Debug, Clone)]
pub struct ReadBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ReadBuffer<'a> {
    /// Create a reader over the given bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        let byte = *self.data.get(self.pos).ok_or(ProtocolError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read an unsigned 32-bit integer written in UB4 form.
    pub fn read_ub4(&mut self) -> Result<u32, ProtocolError> {
        let len = self.read_u8()?;
        if len == 0 {
            return Ok(0);
        }
        if len > 4 {
            return Err(ProtocolError::InvalidUb4Length(len));
        }
        let len = len as usize;
        if self.remaining() < len {
            return Err(ProtocolError::IncompleteBuffer {
                needed: len,
                available: self.remaining(),
            });
        }
        let value = self.data[self.pos..self.pos + len]
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
        self.pos += len;
        Ok(value)
    }

    /// Read a piggy-back header, returning its function code.
    pub fn read_piggyback_header(&mut self) -> Result<u8, ProtocolError> {
        let msg_type = self.read_u8()?;
        if msg_type != MSG_TYPE_PIGGYBACK {
            return Err(ProtocolError::InvalidMessageType(msg_type));
        }
        let function_code = self.read_u8()?;
        let _seq = self.read_u8()?;
        Ok(function_code)
    }

    /// Read the body of a close-cursors piggy-back (after its header).
    pub fn read_close_cursors(&mut self) -> Result<Vec<u32>, ProtocolError> {
        let _pointer = self.read_u8()?;
        let count = self.read_ub4()?;
        (0..count).map(|_| self.read_ub4()).collect()
    }
}
