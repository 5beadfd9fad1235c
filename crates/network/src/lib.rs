//! # ut2query Networking Layer
//!
//! Blocking query clients for Unreal Engine 2 principal servers and game
//! servers, built on the wire formats in `ut2query-protocol`.
//!
//! ## Modules
//!
//! - [`config`] - Session timeouts and limits
//! - [`transport`] - Datagram and stream sockets
//! - [`session`] - Retry, timeout and challenge handling
//! - [`directory`] - Principal server list client
//! - [`server`] - Game server info/rules/players client
//!
//! Every call blocks the calling thread for at most
//! [`SessionConfig::worst_case`] per exchange round. Run many sessions on
//! separate threads to query servers concurrently; a session itself is not
//! shared between threads.

pub mod config;
pub mod directory;
pub mod server;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use config::SessionConfig;
pub use directory::{DirectoryDialect, DirectoryQuery};
pub use server::{ServerDialect, ServerQuery};
pub use session::{resolve, Dialect, PlainDialect, Reply, Session, SessionState};
pub use transport::{TcpTransport, Transport, UdpTransport};
