//! Sequential little-endian reader over a borrowed byte buffer.
//!
//! Every read either consumes exactly the bytes it declares or fails with
//! [`DecodeError::OutOfBounds`] and leaves the position untouched.

use crate::error::DecodeError;

/// Forward-only cursor used by the vendor header decoder.
#[derive(Debug)]
pub struct ByteCursor<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::OutOfBounds {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    /// Reads a null-terminated string stored in a field of `max_len` bytes.
    ///
    /// The field always occupies `max_len` rounded up to a multiple of four,
    /// regardless of where the terminator sits.
    pub fn read_fixed_string(&mut self, max_len: usize) -> Result<String, DecodeError> {
        let padded = max_len.div_ceil(4) * 4;
        let field = self.take(padded)?;
        let logical = &field[..max_len];
        let end = logical.iter().position(|&b| b == 0).unwrap_or(max_len);
        Ok(String::from_utf8_lossy(&logical[..end]).into_owned())
    }
}
