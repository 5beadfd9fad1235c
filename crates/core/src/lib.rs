//! ut2query Core - error taxonomy and result records shared by every crate

mod error;
mod types;

pub use error::*;
pub use types::*;

/// Crate family version, fixed at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name reported in logs and by the command line tool
pub const PROJECT_NAME: &str = "ut2query";
