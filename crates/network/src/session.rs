//! # Query Session
//!
//! A [`Session`] owns one transport bound to one remote endpoint and runs
//! request/response exchanges over it.
//!
//! # Exchange
//!
//! 1. Send the request
//! 2. Wait up to `timeout` for a response
//! 3. Nothing arrived, or the response failed the dialect's checks: send the
//!    identical request again
//! 4. The remote answered with a challenge: build the answer through the
//!    dialect and run steps 1-3 with it
//!
//! Both rounds draw on one budget of `max_attempts` sends, so an exchange
//! never blocks longer than `max_attempts * timeout`. A challenge arriving on
//! the last attempt leaves nothing to send the answer with.
//!
//! A second challenge, or an explicit refusal, ends the exchange with
//! [`QueryError::Auth`]. Running out of attempts ends it with
//! [`QueryError::Timeout`].
//!
//! # State
//!
//! ```text
//! Idle -> Sending -> AwaitingResponse -> Decoding -> Done
//!            ^              |               |
//!            +-- TimedOut <-+               +-> Failed
//! ```
//!
//! Any state moves to `Closed` on [`Session::close`].

use crate::config::SessionConfig;
use crate::transport::{Transport, UdpTransport};
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::{debug, trace, warn};
use ut2query_core::{QueryError, Result};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sending,
    AwaitingResponse,
    Decoding,
    TimedOut,
    Done,
    Failed,
    Closed,
}

/// How a dialect classified one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Final payload for the caller
    Data(Vec<u8>),
    /// The remote wants this token answered first
    Challenge(Vec<u8>),
    /// The remote refused the request
    Rejected(String),
}

/// Message-level rules layered over a session
///
/// `classify` returning [`QueryError::Decoding`] marks the response as
/// malformed; the session discards it and retries.
pub trait Dialect {
    fn classify(&self, response: &[u8]) -> Result<Reply>;

    /// Build the request answering a challenge `token` for `request`
    fn answer_challenge(&self, request: &[u8], token: &[u8]) -> Result<Vec<u8>> {
        let _ = (request, token);
        Err(QueryError::Auth(
            "Challenge received but this query cannot answer it".to_string(),
        ))
    }
}

/// Every response is final data
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainDialect;

impl Dialect for PlainDialect {
    fn classify(&self, response: &[u8]) -> Result<Reply> {
        Ok(Reply::Data(response.to_vec()))
    }
}

/// Resolve `host:port`, preferring IPv4 results
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| QueryError::Connection(format!("Failed to resolve {}:{}: {}", host, port, e)))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| QueryError::Connection(format!("No addresses found for {}:{}", host, port)))
}

/// One remote endpoint, one transport, any number of exchanges
pub struct Session<T: Transport = UdpTransport> {
    transport: Option<T>,
    remote: SocketAddr,
    config: SessionConfig,
    state: SessionState,
    attempts: u32,
}

impl<T: Transport> Session<T> {
    /// Resolve `host` and bind a transport to it
    pub fn open(host: &str, port: u16, config: SessionConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| QueryError::Connection(format!("Invalid session config: {}", e)))?;

        let remote = resolve(host, port)?;
        let transport = T::connect(remote, &config)?;
        debug!("Session opened to {} ({}:{})", remote, host, port);

        Ok(Self::with_transport(transport, remote, config))
    }

    /// Wrap an already connected transport
    pub fn with_transport(transport: T, remote: SocketAddr, config: SessionConfig) -> Self {
        Self {
            transport: Some(transport),
            remote,
            config,
            state: SessionState::Idle,
            attempts: 0,
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sends performed by the most recent exchange, challenge round included;
    /// never more than `max_attempts`
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Run one full exchange for `request` and return the final payload
    pub fn exchange<D: Dialect + ?Sized>(&mut self, dialect: &D, request: &[u8]) -> Result<Vec<u8>> {
        if self.transport.is_none() {
            return Err(QueryError::Connection(format!(
                "Session to {} is closed",
                self.remote
            )));
        }

        self.attempts = 0;
        let result = self.run_exchange(dialect, request);
        self.state = match result {
            Ok(_) => SessionState::Done,
            Err(_) => SessionState::Failed,
        };
        result
    }

    fn run_exchange<D: Dialect + ?Sized>(&mut self, dialect: &D, request: &[u8]) -> Result<Vec<u8>> {
        let token = match self.round_trip(dialect, request)? {
            Reply::Data(data) => return Ok(data),
            Reply::Challenge(token) => token,
            Reply::Rejected(reason) => return Err(QueryError::Auth(reason)),
        };

        debug!("{} issued a challenge ({} byte token)", self.remote, token.len());
        let answer = dialect.answer_challenge(request, &token)?;

        match self.round_trip(dialect, &answer)? {
            Reply::Data(data) => Ok(data),
            Reply::Challenge(_) => Err(QueryError::Auth(format!(
                "{} issued a second challenge",
                self.remote
            ))),
            Reply::Rejected(reason) => Err(QueryError::Auth(reason)),
        }
    }

    /// Send `request` until a response passes the dialect or the attempt
    /// budget of the whole exchange runs out
    fn round_trip<D: Dialect + ?Sized>(&mut self, dialect: &D, request: &[u8]) -> Result<Reply> {
        let max_attempts = self.config.max_attempts;
        let timeout = self.config.timeout;

        while self.attempts < max_attempts {
            let transport = self.transport.as_mut().ok_or_else(|| {
                QueryError::Connection(format!("Session to {} is closed", self.remote))
            })?;

            self.state = SessionState::Sending;
            self.attempts += 1;
            let attempt = self.attempts;
            trace!("Attempt {}/{} to {}", attempt, max_attempts, self.remote);
            transport.send(request)?;

            self.state = SessionState::AwaitingResponse;
            let response = match transport.recv_timeout(timeout)? {
                Some(response) => response,
                None => {
                    self.state = SessionState::TimedOut;
                    debug!(
                        "Attempt {}/{} to {} timed out after {:?}",
                        attempt, max_attempts, self.remote, timeout
                    );
                    continue;
                }
            };

            self.state = SessionState::Decoding;
            match dialect.classify(&response) {
                Ok(reply) => return Ok(reply),
                Err(QueryError::Decoding(reason)) => {
                    warn!(
                        "Discarding malformed response from {} ({} bytes): {}",
                        self.remote,
                        response.len(),
                        reason
                    );
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            "No usable response from {} after {} attempts",
            self.remote, self.attempts
        );
        Err(QueryError::Timeout {
            attempts: self.attempts,
        })
    }

    /// Release the transport. Later exchanges fail with a connection error.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            debug!("Session to {} closed", self.remote);
        }
        self.state = SessionState::Closed;
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("remote", &self.remote)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("open", &self.transport.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{session_with, ScriptedTransport, Step};

    /// Data is `D...`, challenges are `C<token>`, refusals are `R<reason>`
    struct TaggedDialect;

    impl Dialect for TaggedDialect {
        fn classify(&self, response: &[u8]) -> Result<Reply> {
            match response.split_first() {
                Some((b'D', rest)) => Ok(Reply::Data(rest.to_vec())),
                Some((b'C', rest)) => Ok(Reply::Challenge(rest.to_vec())),
                Some((b'R', rest)) => Ok(Reply::Rejected(String::from_utf8_lossy(rest).into_owned())),
                _ => Err(QueryError::decoding("unknown tag")),
            }
        }

        fn answer_challenge(&self, request: &[u8], token: &[u8]) -> Result<Vec<u8>> {
            let mut answer = b"A".to_vec();
            answer.extend_from_slice(token);
            answer.extend_from_slice(request);
            Ok(answer)
        }
    }

    #[test]
    fn test_answer_on_first_attempt() {
        let mut session = session_with(vec![Step::reply(b"Dhello")], 3);

        let data = session.exchange(&TaggedDialect, b"req").unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(session.attempts(), 1);
        assert_eq!(session.state(), SessionState::Done);
    }

    #[test]
    fn test_drops_then_success() {
        for drops in 0..3 {
            let mut script = vec![Step::Drop; drops];
            script.push(Step::reply(b"Dok"));
            let mut session = session_with(script, 3);

            assert_eq!(session.exchange(&TaggedDialect, b"req").unwrap(), b"ok");
            assert_eq!(session.attempts(), drops as u32 + 1);

            let sent = &session.transport().unwrap().sent;
            assert_eq!(sent.len(), drops + 1);
            assert!(sent.iter().all(|payload| payload == b"req"));
        }
    }

    #[test]
    fn test_always_drop_times_out() {
        let mut session = session_with(Vec::new(), 4);

        let err = session.exchange(&TaggedDialect, b"req").unwrap_err();
        assert!(matches!(err, QueryError::Timeout { attempts: 4 }));
        assert_eq!(session.transport().unwrap().sent.len(), 4);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_malformed_response_consumes_attempt() {
        let script = vec![Step::reply(b"garbage"), Step::reply(b"Dfine")];
        let mut session = session_with(script, 2);

        assert_eq!(session.exchange(&TaggedDialect, b"req").unwrap(), b"fine");
        assert_eq!(session.attempts(), 2);

        let script = vec![Step::reply(b"garbage"), Step::reply(b"junk")];
        let mut session = session_with(script, 2);
        assert!(matches!(
            session.exchange(&TaggedDialect, b"req"),
            Err(QueryError::Timeout { attempts: 2 })
        ));
    }

    #[test]
    fn test_challenge_then_data() {
        let script = vec![Step::reply(b"Ctok"), Step::reply(b"Dlist")];
        let mut session = session_with(script, 3);

        assert_eq!(session.exchange(&TaggedDialect, b"req").unwrap(), b"list");

        let sent = &session.transport().unwrap().sent;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], b"req");
        assert_eq!(sent[1], b"Atokreq");
    }

    #[test]
    fn test_challenge_answer_is_retried_within_budget() {
        let script = vec![Step::reply(b"Ctok"), Step::Drop, Step::reply(b"Dlist")];
        let mut session = session_with(script, 3);

        assert_eq!(session.exchange(&TaggedDialect, b"req").unwrap(), b"list");
        let sent = &session.transport().unwrap().sent;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1], sent[2]);
        assert_eq!(session.attempts(), 3);
    }

    #[test]
    fn test_challenge_shares_attempt_budget() {
        let script = vec![Step::reply(b"Ctok"), Step::Drop, Step::reply(b"Dlate")];
        let mut session = session_with(script, 2);

        let err = session.exchange(&TaggedDialect, b"req").unwrap_err();
        assert!(matches!(err, QueryError::Timeout { attempts: 2 }));
        assert_eq!(session.transport().unwrap().sent.len(), 2);
    }

    #[test]
    fn test_challenge_then_drops_stays_within_max_attempts() {
        let mut session = session_with(vec![Step::reply(b"Ctok")], 3);

        let err = session.exchange(&TaggedDialect, b"req").unwrap_err();
        assert!(matches!(err, QueryError::Timeout { attempts: 3 }));

        let sent = &session.transport().unwrap().sent;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], b"req");
        assert!(sent[1..].iter().all(|payload| payload == b"Atokreq"));
    }

    #[test]
    fn test_challenge_on_last_attempt_times_out() {
        let script = vec![Step::Drop, Step::reply(b"Ctok"), Step::reply(b"Dnever")];
        let mut session = session_with(script, 2);

        assert!(matches!(
            session.exchange(&TaggedDialect, b"req"),
            Err(QueryError::Timeout { attempts: 2 })
        ));
        assert_eq!(session.transport().unwrap().sent.len(), 2);
    }

    #[test]
    fn test_second_challenge_fails_without_third_round() {
        let script = vec![
            Step::reply(b"Cone"),
            Step::reply(b"Ctwo"),
            Step::reply(b"Dnever"),
        ];
        let mut session = session_with(script, 3);

        let err = session.exchange(&TaggedDialect, b"req").unwrap_err();
        assert!(matches!(err, QueryError::Auth(_)));
        assert_eq!(session.transport().unwrap().sent.len(), 2);
    }

    #[test]
    fn test_rejection_is_auth_error() {
        let mut session = session_with(vec![Step::reply(b"Rbad key")], 3);

        match session.exchange(&TaggedDialect, b"req") {
            Err(QueryError::Auth(reason)) => assert_eq!(reason, "bad key"),
            other => panic!("expected auth error, got {:?}", other),
        }
        assert_eq!(session.attempts(), 1);
    }

    #[test]
    fn test_plain_dialect_cannot_answer_challenge() {
        let dialect = PlainDialect;
        assert!(matches!(dialect.classify(b"x"), Ok(Reply::Data(_))));
        assert!(matches!(
            dialect.answer_challenge(b"req", b"tok"),
            Err(QueryError::Auth(_))
        ));
    }

    #[test]
    fn test_transport_error_is_not_retried() {
        let mut session = session_with(vec![Step::Fail, Step::reply(b"Dlate")], 3);

        let err = session.exchange(&TaggedDialect, b"req").unwrap_err();
        assert!(matches!(err, QueryError::Connection(_)));
        assert_eq!(session.attempts(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut session = session_with(vec![Step::reply(b"Dok")], 3);
        assert!(session.is_open());

        session.close();
        session.close();
        assert!(!session.is_open());
        assert_eq!(session.state(), SessionState::Closed);

        let err = session.exchange(&PlainDialect, b"req").unwrap_err();
        assert!(matches!(err, QueryError::Connection(_)));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_drop_closes_transport() {
        let closes = {
            let session = session_with(Vec::new(), 1);
            let counter = session.transport().unwrap().close_counter();
            drop(session);
            counter
        };
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_session_reusable_after_failure() {
        let script = vec![Step::Drop, Step::reply(b"Dsecond")];
        let mut session = session_with(script, 1);

        assert!(session.exchange(&TaggedDialect, b"first").is_err());
        assert_eq!(session.exchange(&TaggedDialect, b"again").unwrap(), b"second");
        assert_eq!(session.attempts(), 1);
    }

    #[test]
    fn test_resolve_localhost() {
        let addr = resolve("127.0.0.1", 7787).unwrap();
        assert_eq!(addr.port(), 7787);
        assert!(addr.is_ipv4());

        assert!(matches!(
            resolve("host.invalid", 28902),
            Err(QueryError::Connection(_))
        ));
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let config = SessionConfig::new(std::time::Duration::from_secs(1), 0);
        let result = Session::<UdpTransport>::open("127.0.0.1", 7787, config);
        assert!(matches!(result, Err(QueryError::Connection(_))));
    }
}
