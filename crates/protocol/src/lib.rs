//! # ut2query Protocol Library
//!
//! Wire formats spoken by Unreal Engine 2 principal servers and game servers,
//! reproduced byte for byte. Nothing in this crate performs I/O.
//!
//! ## Architecture
//!
//! ### 1. Codecs Layer ([`codecs`])
//! - Compact integer: signed, 1-5 bytes, 32 magnitude bits
//! - Length-prefixed string: 1 length byte (capped at 255), payload, NUL
//!
//! ### 2. Buffer ([`buffer`])
//! Growable message buffer with an independent read cursor, built on the
//! codecs plus raw little-endian integers.
//!
//! ### 3. Messages ([`directory`], [`server`])
//! Request builders and response decoders for the principal server list and
//! for the info, rules and players queries.
//!
//! ### 4. Helpers ([`address`], [`text`])
//! Packed IPv4 addresses, Latin-1 text and colour code stripping.
//!
//! ## Usage Example
//!
//! ```rust
//! use ut2query_protocol::Buffer;
//!
//! let mut buf = Buffer::new();
//! buf.write_compact_int(-8191).unwrap();
//! buf.write_lpstring(b"DM-Rankin");
//! assert_eq!(&buf.as_bytes()[..2], &[0xFF, 0x7F]);
//!
//! let mut reader = Buffer::from_bytes(buf.as_bytes());
//! assert_eq!(reader.read_compact_int().unwrap(), -8191);
//! assert_eq!(reader.read_lpstring().unwrap(), b"DM-Rankin");
//! ```

pub mod address;
pub mod buffer;
pub mod codecs;
pub mod directory;
pub mod server;
pub mod text;

// Re-export commonly used items
pub use address::*;
pub use buffer::Buffer;
pub use codecs::*;
pub use directory::{ClientIdentity, DirectoryReply, Filter, FilterOp};
pub use server::{QueryType, TextMode};
