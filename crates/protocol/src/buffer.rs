//! Message buffer with an independent read cursor
//!
//! One `Buffer` is built per outgoing request and one per incoming response.
//! Writes always append; reads start at the cursor and advance it. The
//! written content stays intact, so [`Buffer::as_bytes`] returns the whole
//! message regardless of how much has been read.

use crate::codecs;
use bytes::{Buf, BufMut, BytesMut};
use ut2query_core::{QueryError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: BytesMut,
    pos: usize,
}

impl Buffer {
    /// Create an empty buffer for writing
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap received bytes for reading
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            data: BytesMut::from(data),
            pos: 0,
        }
    }

    /// Full written content, independent of the cursor
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data.to_vec()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current read offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Run a codec against the unread bytes and advance past what it consumed
    fn read_with<T>(&mut self, read: impl FnOnce(&mut &[u8]) -> Result<T>) -> Result<T> {
        let mut unread = &self.data[self.pos..];
        let before = unread.len();
        let value = read(&mut unread)?;
        self.pos += before - unread.len();
        Ok(value)
    }

    fn ensure(&self, n: usize, what: &str) -> Result<()> {
        if self.remaining() < n {
            return Err(QueryError::decoding(format!(
                "Not enough bytes for {}: need {}, have {}",
                what,
                n,
                self.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_compact_int(&mut self) -> Result<i64> {
        self.read_with(|buf| codecs::read_compact_int(buf))
    }

    pub fn write_compact_int(&mut self, val: i64) -> Result<()> {
        codecs::write_compact_int(&mut self.data, val)
    }

    /// Read a length-prefixed string, without its NUL terminator
    pub fn read_lpstring(&mut self) -> Result<Vec<u8>> {
        self.read_with(|buf| codecs::read_lpstring(buf))
    }

    pub fn write_lpstring(&mut self, data: &[u8]) {
        codecs::write_lpstring(&mut self.data, data);
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1, "u8")?;
        self.read_with(|buf| Ok(buf.get_u8()))
    }

    pub fn write_u8(&mut self, val: u8) {
        self.data.put_u8(val);
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.ensure(2, "u16")?;
        self.read_with(|buf| Ok(buf.get_u16_le()))
    }

    pub fn write_u16_le(&mut self, val: u16) {
        self.data.put_u16_le(val);
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.ensure(4, "u32")?;
        self.read_with(|buf| Ok(buf.get_u32_le()))
    }

    pub fn write_u32_le(&mut self, val: u32) {
        self.data.put_u32_le(val);
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n, "raw bytes")?;
        let out = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(out)
    }

    /// Everything after the cursor; leaves the buffer exhausted
    pub fn read_remaining(&mut self) -> Vec<u8> {
        let out = self.data[self.pos..].to_vec();
        self.pos = self.data.len();
        out
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.data.put_slice(data);
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data: BytesMut::from(&data[..]),
            pos: 0,
        }
    }
}
