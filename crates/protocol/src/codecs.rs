//! Unreal Engine 2 binary codecs with exact wire compatibility
//!
//! Two encodings appear in every principal-server and server-query message:
//! the signed variable-length "compact integer" and the length-prefixed,
//! NUL-terminated string.

use bytes::{Buf, BufMut};
use ut2query_core::{QueryError, Result};

/// Largest magnitude a compact integer can carry (32 magnitude bits)
pub const COMPACT_INT_MAX: i64 = u32::MAX as i64;

/// Longest encoding of a compact integer
pub const COMPACT_INT_MAX_LEN: usize = 5;

const SIGN_BIT: u8 = 0x80;
const FIRST_MORE_BIT: u8 = 0x40;
const FIRST_VALUE_MASK: u8 = 0x3F;
const MORE_BIT: u8 = 0x80;
const VALUE_MASK: u8 = 0x7F;
const LAST_VALUE_MASK: u8 = 0x1F;

/// Longest length a string prefix byte can announce
pub const MAX_STRING_PREFIX: usize = 255;

/// Read a compact integer
///
/// # Format
/// - Byte 0: sign (0x80), more (0x40), magnitude bits 0-5
/// - Bytes 1-3: more (0x80), next 7 magnitude bits each
/// - Byte 4: final 5 magnitude bits, no more bit
///
/// Non-minimal encodings (`40 00`) and negative zero (`80`) are not produced
/// by [`write_compact_int`] but are accepted and decode to their value, so
/// re-encoding them yields the minimal bytes instead.
#[inline]
pub fn read_compact_int<B: Buf>(buf: &mut B) -> Result<i64> {
    if !buf.has_remaining() {
        return Err(QueryError::decoding("Not enough bytes for compact integer"));
    }

    let first = buf.get_u8();
    let negative = first & SIGN_BIT != 0;
    let mut magnitude = (first & FIRST_VALUE_MASK) as u64;
    let mut more = first & FIRST_MORE_BIT != 0;
    let mut shift = 6;

    for index in 1..COMPACT_INT_MAX_LEN {
        if !more {
            break;
        }
        if !buf.has_remaining() {
            return Err(QueryError::decoding(format!(
                "Compact integer truncated after {} byte(s)",
                index
            )));
        }

        let byte = buf.get_u8();
        if index == COMPACT_INT_MAX_LEN - 1 {
            if byte & !LAST_VALUE_MASK != 0 {
                return Err(QueryError::decoding(format!(
                    "Compact integer overflows 32 bits (final byte 0x{:02X})",
                    byte
                )));
            }
            magnitude |= (byte as u64) << shift;
            more = false;
        } else {
            magnitude |= ((byte & VALUE_MASK) as u64) << shift;
            more = byte & MORE_BIT != 0;
            shift += 7;
        }
    }

    let magnitude = magnitude as i64;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Write a compact integer using the fewest bytes that hold its magnitude
///
/// Values outside `-COMPACT_INT_MAX..=COMPACT_INT_MAX` are rejected and nothing
/// is written.
#[inline]
pub fn write_compact_int<B: BufMut>(buf: &mut B, val: i64) -> Result<()> {
    if !(-COMPACT_INT_MAX..=COMPACT_INT_MAX).contains(&val) {
        return Err(QueryError::decoding(format!(
            "Compact integer out of range: {}",
            val
        )));
    }

    let mut remaining = val.unsigned_abs();

    let mut first = (remaining & FIRST_VALUE_MASK as u64) as u8;
    if val < 0 {
        first |= SIGN_BIT;
    }
    remaining >>= 6;
    if remaining > 0 {
        first |= FIRST_MORE_BIT;
    }
    buf.put_u8(first);

    let mut index = 1;
    while remaining > 0 {
        if index == COMPACT_INT_MAX_LEN - 1 {
            buf.put_u8((remaining & LAST_VALUE_MASK as u64) as u8);
            break;
        }

        let mut byte = (remaining & VALUE_MASK as u64) as u8;
        remaining >>= 7;
        if remaining > 0 {
            byte |= MORE_BIT;
        }
        buf.put_u8(byte);
        index += 1;
    }

    Ok(())
}

/// Number of bytes `write_compact_int` emits for `val`
pub fn compact_int_len(val: i64) -> usize {
    let mut remaining = val.unsigned_abs() >> 6;
    let mut len = 1;
    while remaining > 0 && len < COMPACT_INT_MAX_LEN {
        remaining >>= 7;
        len += 1;
    }
    len
}

/// Read a length-prefixed string
///
/// # Format
/// - 1 byte: length `n` (0-255), including the terminator
/// - `n` bytes: payload followed by a NUL terminator
///
/// The trailing NUL, when present, is not part of the returned payload.
#[inline]
pub fn read_lpstring<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    if !buf.has_remaining() {
        return Err(QueryError::decoding("Not enough bytes for string length"));
    }

    let len = buf.get_u8() as usize;
    if buf.remaining() < len {
        return Err(QueryError::decoding(format!(
            "Not enough bytes for string: need {}, have {}",
            len,
            buf.remaining()
        )));
    }

    let mut data = buf.copy_to_bytes(len).to_vec();
    if data.last() == Some(&0) {
        data.pop();
    }
    Ok(data)
}

/// Write a length-prefixed string
///
/// The prefix is capped at 255 while the whole payload is still written, so
/// payloads of 255 bytes or more carry a prefix that under-states their real
/// length. Real servers expect exactly this output.
#[inline]
pub fn write_lpstring<B: BufMut>(buf: &mut B, data: &[u8]) {
    let len = (data.len() + 1).min(MAX_STRING_PREFIX);
    buf.put_u8(len as u8);
    buf.put_slice(data);
    buf.put_u8(0);
}

/// Pack `data` as a standalone length-prefixed string
pub fn pack(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 2);
    write_lpstring(&mut out, data);
    out
}
