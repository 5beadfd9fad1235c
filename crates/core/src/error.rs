//! Core error types for ut2query

/// Failure kinds surfaced by every query layer.
///
/// The set is closed so callers can match exhaustively and pick a recovery
/// policy per kind (retry a directory lookup, skip one silent server, ...).
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    /// Malformed or truncated wire content
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// The transport could not be established or died
    #[error("Connection error: {0}")]
    Connection(String),

    /// Every attempt expired without a valid response
    #[error("Timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// Challenge rejected, or more than one challenge round requested
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl QueryError {
    /// Shorthand for building a [`QueryError::Decoding`]
    pub fn decoding(msg: impl Into<String>) -> Self {
        QueryError::Decoding(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, QueryError::Timeout { .. })
    }
}

impl From<std::io::Error> for QueryError {
    fn from(err: std::io::Error) -> Self {
        QueryError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
