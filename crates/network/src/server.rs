//! # Game Server Client
//!
//! Queries one game server for its info table, its rules table and its
//! player list. Each query is an independent exchange on the same session.
//!
//! Servers never challenge. A response carrying the wrong header or the wrong
//! query type is treated like a lost datagram and the request is re-sent.

use crate::config::SessionConfig;
use crate::session::{Dialect, Reply, Session};
use crate::transport::{Transport, UdpTransport};
use tracing::debug;
use ut2query_core::{KeyValues, Player, Result, ServerStatus};
use ut2query_protocol::server::{self, QueryType, TextMode};

/// Response rules for one query type
#[derive(Debug, Clone, Copy)]
pub struct ServerDialect {
    query_type: QueryType,
}

impl ServerDialect {
    pub fn new(query_type: QueryType) -> Self {
        Self { query_type }
    }
}

impl Dialect for ServerDialect {
    fn classify(&self, response: &[u8]) -> Result<Reply> {
        let body = server::split_response(self.query_type, response)?;
        Ok(Reply::Data(body.to_vec()))
    }
}

/// Client for one game server's query port
#[derive(Debug)]
pub struct ServerQuery<T: Transport = UdpTransport> {
    session: Session<T>,
    text_mode: TextMode,
}

impl<T: Transport> ServerQuery<T> {
    pub fn open(host: &str, port: u16, config: SessionConfig) -> Result<Self> {
        Ok(Self::from_session(Session::open(host, port, config)?))
    }

    pub fn from_session(session: Session<T>) -> Self {
        Self {
            session,
            text_mode: TextMode::default(),
        }
    }

    /// Keep or strip colour codes in decoded strings
    pub fn with_text_mode(mut self, text_mode: TextMode) -> Self {
        self.text_mode = text_mode;
        self
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    fn query(&mut self, query_type: QueryType) -> Result<Vec<u8>> {
        let request = server::encode_query(query_type);
        let body = self.session.exchange(&ServerDialect::new(query_type), &request)?;
        debug!(
            "{} answered {} query with {} bytes",
            self.session.remote(),
            query_type.name(),
            body.len()
        );
        Ok(body)
    }

    pub fn get_info(&mut self) -> Result<KeyValues> {
        let body = self.query(QueryType::Info)?;
        server::decode_key_values(&body, self.text_mode)
    }

    pub fn get_rules(&mut self) -> Result<KeyValues> {
        let body = self.query(QueryType::Rules)?;
        server::decode_key_values(&body, self.text_mode)
    }

    pub fn get_players(&mut self) -> Result<Vec<Player>> {
        let body = self.query(QueryType::Players)?;
        server::decode_players(&body, self.text_mode)
    }

    /// Info, rules and players in one call; the first failure aborts
    pub fn status(&mut self) -> Result<ServerStatus> {
        Ok(ServerStatus {
            info: self.get_info()?,
            rules: self.get_rules()?,
            players: self.get_players()?,
        })
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{session_with, Step};
    use std::net::UdpSocket;
    use std::thread;
    use std::time::Duration;
    use ut2query_core::QueryError;
    use ut2query_protocol::server::{encode_key_values, encode_players, encode_response};

    fn info() -> KeyValues {
        let mut table = KeyValues::new();
        table.push("hostname", "Frag Central");
        table.push("mapname", "DM-Rankin");
        table.push("maxplayers", "16");
        table
    }

    fn rules() -> KeyValues {
        let mut table = KeyValues::new();
        table.push("Mutator", "MutInstaGib");
        table.push("Mutator", "MutNoAdrenaline");
        table.push("GoalScore", "25");
        table
    }

    fn players() -> Vec<Player> {
        vec![Player {
            name: "Xan".into(),
            ping: "0".into(),
            score: "9".into(),
            team: "255".into(),
        }]
    }

    #[test]
    fn test_get_info() {
        let reply = encode_response(QueryType::Info, &encode_key_values(&info()));
        let mut query = ServerQuery::from_session(session_with(vec![Step::Reply(reply)], 3));

        assert_eq!(query.get_info().unwrap(), info());
        assert_eq!(
            query.session().transport().unwrap().sent[0],
            server::encode_query(QueryType::Info)
        );
    }

    #[test]
    fn test_empty_rules() {
        let reply = encode_response(QueryType::Rules, b"");
        let mut query = ServerQuery::from_session(session_with(vec![Step::Reply(reply)], 3));
        assert!(query.get_rules().unwrap().is_empty());
    }

    #[test]
    fn test_wrong_query_type_is_retried() {
        let script = vec![
            Step::Reply(encode_response(QueryType::Info, &encode_key_values(&info()))),
            Step::Reply(encode_response(QueryType::Players, &encode_players(&players()))),
        ];
        let mut query = ServerQuery::from_session(session_with(script, 3));

        assert_eq!(query.get_players().unwrap(), players());
        assert_eq!(query.session().attempts(), 2);
    }

    #[test]
    fn test_foreign_header_is_retried() {
        let mut foreign = encode_response(QueryType::Info, &encode_key_values(&info()));
        foreign[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let script = vec![
            Step::Reply(foreign),
            Step::Reply(encode_response(QueryType::Info, &encode_key_values(&info()))),
        ];
        let mut query = ServerQuery::from_session(session_with(script, 3));

        assert_eq!(query.get_info().unwrap(), info());
        assert_eq!(query.session().attempts(), 2);
    }

    #[test]
    fn test_short_response_is_retried_then_times_out() {
        let script = vec![Step::reply(&[0x80, 0x00]), Step::Drop];
        let mut query = ServerQuery::from_session(session_with(script, 2));

        assert!(matches!(
            query.get_info(),
            Err(QueryError::Timeout { attempts: 2 })
        ));
    }

    #[test]
    fn test_odd_key_value_body_is_decoding_error() {
        let mut body = encode_key_values(&info());
        body.extend_from_slice(b"\x05lone\x00");
        let reply = encode_response(QueryType::Info, &body);
        let mut query = ServerQuery::from_session(session_with(vec![Step::Reply(reply)], 3));

        assert!(matches!(query.get_info(), Err(QueryError::Decoding(_))));
    }

    #[test]
    fn test_status_aborts_on_first_failure() {
        let script = vec![Step::Reply(encode_response(
            QueryType::Info,
            &encode_key_values(&info()),
        ))];
        let mut query = ServerQuery::from_session(session_with(script, 1));

        assert!(query.status().unwrap_err().is_timeout());
        assert_eq!(query.session().transport().unwrap().sent.len(), 2);
    }

    #[test]
    fn test_raw_text_mode_keeps_colors() {
        let mut table = KeyValues::new();
        table.push("hostname", "\u{1b}\u{ff}\u{0}\u{0}Red");
        let reply = encode_response(QueryType::Info, &encode_key_values(&table));

        let mut raw = ServerQuery::from_session(session_with(vec![Step::Reply(reply.clone())], 1))
            .with_text_mode(TextMode::Raw);
        assert_eq!(raw.get_info().unwrap(), table);

        let mut stripped = ServerQuery::from_session(session_with(vec![Step::Reply(reply)], 1));
        assert_eq!(stripped.get_info().unwrap().get("hostname"), Some("Red"));
    }

    #[test]
    fn test_datagram_loopback_status() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = peer.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let mut buf = [0u8; 64];
            for _ in 0..3 {
                let (n, from) = peer.recv_from(&mut buf).unwrap();
                assert_eq!(n, 5);
                let query_type = QueryType::from_u8(buf[4]).unwrap();
                let body = match query_type {
                    QueryType::Info => encode_key_values(&info()),
                    QueryType::Rules => encode_key_values(&rules()),
                    QueryType::Players => encode_players(&players()),
                };
                peer.send_to(&encode_response(query_type, &body), from).unwrap();
            }
        });

        let config = SessionConfig::new(Duration::from_secs(2), 2);
        let mut query = ServerQuery::<UdpTransport>::open("127.0.0.1", port, config).unwrap();
        let status = query.status().unwrap();

        assert_eq!(status.info, info());
        assert_eq!(status.rules.get_all("Mutator").count(), 2);
        assert_eq!(status.players, players());
        server.join().unwrap();
    }

    #[test]
    fn test_datagram_silent_server_times_out() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let port = peer.local_addr().unwrap().port();

        let config = SessionConfig::new(Duration::from_millis(50), 3);
        let mut query = ServerQuery::<UdpTransport>::open("127.0.0.1", port, config).unwrap();

        assert!(matches!(
            query.get_info(),
            Err(QueryError::Timeout { attempts: 3 })
        ));

        let mut buf = [0u8; 16];
        for _ in 0..3 {
            let (n, _) = peer.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..n], server::encode_query(QueryType::Info).as_slice());
        }
    }
}
