//! Principal server messages
//!
//! # Request
//! `[command: compact][filter count: compact]` then per filter
//! `[key: string][value: string][operator: compact]`.
//!
//! # Reply
//! A tag string followed by a tag-specific body:
//! - `CHALLENGE` `[token: string]`
//! - `DENIED` `[reason: string]`
//! - `APPROVED` `[count: compact]` then `count` entries of
//!   `[address: u32 LE][game port: u16 LE][query port: u16 LE]`
//!
//! # Challenge answer
//! `RESPONSE` `[hex digest of cd key]` `[hex digest of cd key + token]`
//! `[client name]` `[client version: compact]` followed by the original request.

use crate::address::{int_to_ip, ipv4_to_int};
use crate::buffer::Buffer;
use crate::text::decode_latin1;
use sha2::{Digest, Sha256};
use std::net::Ipv4Addr;
use tracing::trace;
use ut2query_core::{DirectoryEntry, QueryError, Result};

/// Command code asking for the registered server list
pub const COMMAND_LIST_SERVERS: i64 = 0;

pub const TAG_CHALLENGE: &[u8] = b"CHALLENGE";
pub const TAG_DENIED: &[u8] = b"DENIED";
pub const TAG_APPROVED: &[u8] = b"APPROVED";
pub const TAG_RESPONSE: &[u8] = b"RESPONSE";

/// Bytes per server list entry: address, game port, query port
pub const ENTRY_LEN: usize = 8;

/// Comparison applied by the principal server to one filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equals = 0,
    NotEquals = 1,
    LessThan = 2,
    GreaterThan = 3,
}

impl FilterOp {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(FilterOp::Equals),
            1 => Some(FilterOp::NotEquals),
            2 => Some(FilterOp::LessThan),
            3 => Some(FilterOp::GreaterThan),
            _ => None,
        }
    }

    /// Parse the textual form used in option files (`=`, `!=`, `<`, `>`)
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "" | "=" | "==" | "eq" => Some(FilterOp::Equals),
            "!=" | "ne" => Some(FilterOp::NotEquals),
            "<" | "lt" => Some(FilterOp::LessThan),
            ">" | "gt" => Some(FilterOp::GreaterThan),
            _ => None,
        }
    }
}

/// One server list filter, e.g. `gametype = xDeathMatch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub key: String,
    pub value: String,
    pub op: FilterOp,
}

impl Filter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            op: FilterOp::Equals,
        }
    }

    pub fn with_op(mut self, op: FilterOp) -> Self {
        self.op = op;
        self
    }
}

/// Build a list request carrying `filters`
pub fn encode_list_request(filters: &[Filter]) -> Result<Vec<u8>> {
    let mut buf = Buffer::new();
    buf.write_compact_int(COMMAND_LIST_SERVERS)?;
    buf.write_compact_int(filters.len() as i64)?;
    for filter in filters {
        buf.write_lpstring(filter.key.as_bytes());
        buf.write_lpstring(filter.value.as_bytes());
        buf.write_compact_int(filter.op as i64)?;
    }
    Ok(buf.into_vec())
}

/// Decoded shape of a principal server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryReply {
    /// Token to answer before the list is released
    Challenge(Vec<u8>),
    /// Credentials or challenge answer refused
    Denied(String),
    /// Server list body following the tag
    Approved(Vec<u8>),
}

/// Split a reply into its tag and body
pub fn parse_reply(data: &[u8]) -> Result<DirectoryReply> {
    let mut buf = Buffer::from_bytes(data);
    let tag = buf.read_lpstring()?;

    match tag.as_slice() {
        TAG_CHALLENGE => {
            let token = buf.read_lpstring()?;
            if token.is_empty() {
                return Err(QueryError::decoding("Empty challenge token"));
            }
            Ok(DirectoryReply::Challenge(token))
        }
        TAG_DENIED => {
            let reason = if buf.is_exhausted() {
                Vec::new()
            } else {
                buf.read_lpstring()?
            };
            Ok(DirectoryReply::Denied(decode_latin1(&reason)))
        }
        TAG_APPROVED => Ok(DirectoryReply::Approved(buf.read_remaining())),
        other => Err(QueryError::decoding(format!(
            "Unknown principal server reply tag: {:?}",
            decode_latin1(other)
        ))),
    }
}

/// Credentials presented when answering a challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub cd_key: String,
    pub name: String,
    pub version: i64,
}

fn hex_digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(*part);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Build the follow-up request answering `token`, re-sending `request`
pub fn encode_challenge_answer(
    identity: &ClientIdentity,
    token: &[u8],
    request: &[u8],
) -> Result<Vec<u8>> {
    let key = identity.cd_key.as_bytes();

    let mut buf = Buffer::new();
    buf.write_lpstring(TAG_RESPONSE);
    buf.write_lpstring(hex_digest(&[key]).as_bytes());
    buf.write_lpstring(hex_digest(&[key, token]).as_bytes());
    buf.write_lpstring(identity.name.as_bytes());
    buf.write_compact_int(identity.version)?;
    buf.write_bytes(request);
    Ok(buf.into_vec())
}

/// Decode an `APPROVED` body into directory entries
///
/// The declared count must match the entries actually present: short bodies
/// and trailing bytes are both rejected.
pub fn decode_server_list(body: &[u8]) -> Result<Vec<DirectoryEntry>> {
    let mut buf = Buffer::from_bytes(body);
    let count = buf.read_compact_int()?;
    if count < 0 {
        return Err(QueryError::decoding(format!("Negative server count: {}", count)));
    }

    let count = count as usize;
    let available = buf.remaining() / ENTRY_LEN;
    if buf.remaining() != count.saturating_mul(ENTRY_LEN) {
        return Err(QueryError::decoding(format!(
            "Server list declares {} entries but carries {} bytes ({} whole entries)",
            count,
            buf.remaining(),
            available
        )));
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let address = int_to_ip(buf.read_u32_le()?);
        let game_port = buf.read_u16_le()?;
        let query_port = buf.read_u16_le()?;
        entries.push(DirectoryEntry::new(address, game_port, query_port));
    }

    trace!("Decoded {} server list entries", entries.len());
    Ok(entries)
}

/// Encode a challenge reply (test fixtures and loopback peers)
pub fn encode_challenge(token: &[u8]) -> Vec<u8> {
    let mut buf = Buffer::new();
    buf.write_lpstring(TAG_CHALLENGE);
    buf.write_lpstring(token);
    buf.into_vec()
}

/// Encode a denial reply (test fixtures and loopback peers)
pub fn encode_denied(reason: &str) -> Vec<u8> {
    let mut buf = Buffer::new();
    buf.write_lpstring(TAG_DENIED);
    buf.write_lpstring(reason.as_bytes());
    buf.into_vec()
}

/// Encode an approved server list reply (test fixtures and loopback peers)
pub fn encode_server_list(entries: &[DirectoryEntry]) -> Result<Vec<u8>> {
    let mut buf = Buffer::new();
    buf.write_lpstring(TAG_APPROVED);
    buf.write_compact_int(entries.len() as i64)?;
    for entry in entries {
        let address: Ipv4Addr = entry.address.parse().map_err(|_| {
            QueryError::decoding(format!("Not an IPv4 address: {}", entry.address))
        })?;
        buf.write_u32_le(ipv4_to_int(address));
        buf.write_u16_le(entry.game_port);
        buf.write_u16_le(entry.query_port);
    }
    Ok(buf.into_vec())
}
