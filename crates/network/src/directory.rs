//! # Principal Server Client
//!
//! Fetches the list of registered game servers from a principal (master)
//! server. The principal server may demand a challenge round before releasing
//! the list; the answer is built from the client's [`ClientIdentity`].
//!
//! # Example
//!
//! ```rust,no_run
//! use ut2query_network::{DirectoryQuery, SessionConfig, UdpTransport};
//! use ut2query_protocol::{ClientIdentity, Filter};
//!
//! let identity = ClientIdentity {
//!     cd_key: "XXXXX-XXXXX-XXXXX-XXXXX".into(),
//!     name: "UT2K4CLIENT".into(),
//!     version: 3369,
//! };
//! let mut query = DirectoryQuery::<UdpTransport>::open(
//!     "ut2004master.epicgames.com",
//!     28902,
//!     identity,
//!     SessionConfig::default(),
//! )?;
//! let servers = query.list_servers_filtered(&[Filter::new("gametype", "xDeathMatch")])?;
//! # Ok::<(), ut2query_core::QueryError>(())
//! ```

use crate::config::SessionConfig;
use crate::session::{Dialect, Reply, Session};
use crate::transport::{Transport, UdpTransport};
use tracing::info;
use ut2query_core::{DirectoryEntry, Result};
use ut2query_protocol::directory::{self, ClientIdentity, DirectoryReply, Filter};

/// Principal server reply rules
#[derive(Debug, Clone)]
pub struct DirectoryDialect {
    identity: ClientIdentity,
}

impl DirectoryDialect {
    pub fn new(identity: ClientIdentity) -> Self {
        Self { identity }
    }
}

impl Dialect for DirectoryDialect {
    fn classify(&self, response: &[u8]) -> Result<Reply> {
        Ok(match directory::parse_reply(response)? {
            DirectoryReply::Challenge(token) => Reply::Challenge(token),
            DirectoryReply::Denied(reason) => {
                Reply::Rejected(format!("Principal server denied access: {}", reason))
            }
            DirectoryReply::Approved(body) => Reply::Data(body),
        })
    }

    fn answer_challenge(&self, request: &[u8], token: &[u8]) -> Result<Vec<u8>> {
        directory::encode_challenge_answer(&self.identity, token, request)
    }
}

/// Client for one principal server
#[derive(Debug)]
pub struct DirectoryQuery<T: Transport = UdpTransport> {
    session: Session<T>,
    dialect: DirectoryDialect,
    filters: Vec<Filter>,
}

impl<T: Transport> DirectoryQuery<T> {
    pub fn open(
        host: &str,
        port: u16,
        identity: ClientIdentity,
        config: SessionConfig,
    ) -> Result<Self> {
        let session = Session::open(host, port, config)?;
        Ok(Self::from_session(session, identity))
    }

    pub fn from_session(session: Session<T>, identity: ClientIdentity) -> Self {
        Self {
            session,
            dialect: DirectoryDialect::new(identity),
            filters: Vec::new(),
        }
    }

    /// Filters applied by [`DirectoryQuery::list_servers`]
    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// List servers matching the configured filters
    pub fn list_servers(&mut self) -> Result<Vec<DirectoryEntry>> {
        let filters = self.filters.clone();
        self.list_servers_filtered(&filters)
    }

    /// List servers matching `filters`
    ///
    /// A list body whose declared count disagrees with its length fails with
    /// a decoding error; it is not retried.
    pub fn list_servers_filtered(&mut self, filters: &[Filter]) -> Result<Vec<DirectoryEntry>> {
        let request = directory::encode_list_request(filters)?;
        let body = self.session.exchange(&self.dialect, &request)?;
        let entries = directory::decode_server_list(&body)?;

        info!(
            "Principal server {} listed {} servers ({} filters, {} sends)",
            self.session.remote(),
            entries.len(),
            filters.len(),
            self.session.attempts()
        );
        Ok(entries)
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}
