//! Game server query messages
//!
//! # Request
//! `79 00 00 00 <query type>`
//!
//! # Response
//! `[header: 4 bytes][query type: 1 byte][body]`. Info and rules bodies are a
//! run of `[key: string][value: string]` pairs; the players body is a run of
//! rows of [`Player::FIELD_COUNT`] strings. Both run until the datagram ends.

use crate::buffer::Buffer;
use crate::text::{decode_latin1, encode_latin1, strip_color_codes};
use tracing::trace;
use ut2query_core::{KeyValues, Player, QueryError, Result};

/// Leading bytes of every server query request
pub const QUERY_PREFIX: [u8; 4] = [0x79, 0x00, 0x00, 0x00];

/// Leading bytes servers put in front of a response
pub const RESPONSE_PREFIX: [u8; 4] = [0x80, 0x00, 0x00, 0x00];

/// Header plus the echoed query type
pub const RESPONSE_MIN_LEN: usize = RESPONSE_PREFIX.len() + 1;

/// Server query request types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueryType {
    Info = 0,
    Rules = 1,
    Players = 2,
}

impl QueryType {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(QueryType::Info),
            1 => Some(QueryType::Rules),
            2 => Some(QueryType::Players),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryType::Info => "info",
            QueryType::Rules => "rules",
            QueryType::Players => "players",
        }
    }
}

/// How wire strings become Rust strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMode {
    /// Latin-1 decode only
    Raw,
    /// Latin-1 decode after removing colour codes
    #[default]
    StripColors,
}

impl TextMode {
    fn decode(self, data: &[u8]) -> String {
        match self {
            TextMode::Raw => decode_latin1(data),
            TextMode::StripColors => decode_latin1(&strip_color_codes(data)),
        }
    }
}

pub fn encode_query(query_type: QueryType) -> Vec<u8> {
    let mut buf = Buffer::new();
    buf.write_bytes(&QUERY_PREFIX);
    buf.write_u8(query_type as u8);
    buf.into_vec()
}

/// Validate a response's header and return its body
///
/// Fails when the response is shorter than the header, carries a header other
/// than [`RESPONSE_PREFIX`], or answers a different query type.
pub fn split_response(query_type: QueryType, data: &[u8]) -> Result<&[u8]> {
    if data.len() < RESPONSE_MIN_LEN {
        return Err(QueryError::decoding(format!(
            "Server response too short: {} bytes",
            data.len()
        )));
    }

    let header = &data[..RESPONSE_PREFIX.len()];
    if header != &RESPONSE_PREFIX[..] {
        return Err(QueryError::decoding(format!(
            "Unexpected server response header {:02X?}",
            header
        )));
    }

    let echoed = data[RESPONSE_PREFIX.len()];
    if echoed != query_type as u8 {
        return Err(QueryError::decoding(format!(
            "Server answered query type {} to a {} query",
            echoed,
            query_type.name()
        )));
    }

    trace!(
        "{} response body: {} bytes",
        query_type.name(),
        data.len() - RESPONSE_MIN_LEN
    );
    Ok(&data[RESPONSE_MIN_LEN..])
}

/// Decode an info or rules body
///
/// A key without a value is an error, never silently dropped.
pub fn decode_key_values(body: &[u8], mode: TextMode) -> Result<KeyValues> {
    let mut buf = Buffer::from_bytes(body);
    let mut table = KeyValues::new();

    while !buf.is_exhausted() {
        let key = buf.read_lpstring()?;
        if buf.is_exhausted() {
            return Err(QueryError::decoding(format!(
                "Missing value for key {:?}",
                decode_latin1(&key)
            )));
        }
        let value = buf.read_lpstring()?;
        table.push(mode.decode(&key), mode.decode(&value));
    }

    Ok(table)
}

/// Decode a players body into rows
pub fn decode_players(body: &[u8], mode: TextMode) -> Result<Vec<Player>> {
    let mut buf = Buffer::from_bytes(body);
    let mut players = Vec::new();

    while !buf.is_exhausted() {
        let mut fields = Vec::with_capacity(Player::FIELD_COUNT);
        for index in 0..Player::FIELD_COUNT {
            if index > 0 && buf.is_exhausted() {
                return Err(QueryError::decoding(format!(
                    "Player row {} ends after {} of {} fields",
                    players.len(),
                    index,
                    Player::FIELD_COUNT
                )));
            }
            fields.push(mode.decode(&buf.read_lpstring()?));
        }

        let mut fields = fields.into_iter();
        players.push(Player {
            name: fields.next().unwrap_or_default(),
            ping: fields.next().unwrap_or_default(),
            score: fields.next().unwrap_or_default(),
            team: fields.next().unwrap_or_default(),
        });
    }

    Ok(players)
}

/// Encode a full response (test fixtures and loopback peers)
pub fn encode_response(query_type: QueryType, body: &[u8]) -> Vec<u8> {
    let mut buf = Buffer::new();
    buf.write_bytes(&RESPONSE_PREFIX);
    buf.write_u8(query_type as u8);
    buf.write_bytes(body);
    buf.into_vec()
}

pub fn encode_key_values(table: &KeyValues) -> Vec<u8> {
    let mut buf = Buffer::new();
    for (key, value) in table.iter() {
        buf.write_lpstring(&encode_latin1(key));
        buf.write_lpstring(&encode_latin1(value));
    }
    buf.into_vec()
}

pub fn encode_players(players: &[Player]) -> Vec<u8> {
    let mut buf = Buffer::new();
    for player in players {
        for field in [&player.name, &player.ping, &player.score, &player.team] {
            buf.write_lpstring(&encode_latin1(field));
        }
    }
    buf.into_vec()
}
