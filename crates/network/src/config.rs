//! # Session Configuration
//!
//! Timeouts and limits applied to every query session.
//!
//! # Example
//!
//! ```rust
//! use ut2query_network::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig {
//!     timeout: Duration::from_millis(1500),
//!     max_attempts: 5,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

/// Smallest response limit that still fits a useful message
pub const MIN_RESPONSE_SIZE: usize = 64;

/// Session configuration options
///
/// # Default Values
///
/// - 2-second timeout per attempt
/// - 3 attempts per exchange
/// - 65535-byte response limit (largest UDP payload)
/// - OS default socket receive buffer
///
/// An exchange blocks for at most `timeout * max_attempts`, challenge round
/// included: the answer to a challenge only gets the attempts left over.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time to wait for a response to one attempt
    ///
    /// # Default
    /// 2 seconds
    ///
    /// # Notes
    /// - Applies per attempt, not to the whole exchange
    /// - Servers across an ocean commonly need 300-500 ms
    pub timeout: Duration,

    /// Total sends per exchange before giving up, challenge answers included
    ///
    /// # Default
    /// 3 attempts
    ///
    /// # Notes
    /// - A response that fails validation also uses up an attempt
    pub max_attempts: u32,

    /// Largest response accepted, in bytes
    ///
    /// # Default
    /// 65535 bytes
    ///
    /// # Notes
    /// - Sizes the datagram receive buffer
    /// - Stream frames announcing more than this are rejected
    pub max_response_size: usize,

    /// Socket receive buffer size (`SO_RCVBUF`)
    ///
    /// # Default
    /// `None` (operating system default)
    pub socket_recv_buffer_size: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_attempts: 3,
            max_response_size: 65535,
            socket_recv_buffer_size: None,
        }
    }
}

impl SessionConfig {
    /// Config with the given timeout and attempt budget, other fields default
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts,
            ..Default::default()
        }
    }

    /// Upper bound on the time one exchange can block
    pub fn worst_case(&self) -> Duration {
        self.timeout * self.max_attempts
    }

    /// Validate the configuration
    ///
    /// # Checks
    /// - `max_attempts` must be > 0
    /// - `timeout` must be > 0
    /// - `max_response_size` must be >= 64
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }

        if self.timeout.is_zero() {
            return Err("timeout must be > 0".to_string());
        }

        if self.max_response_size < MIN_RESPONSE_SIZE {
            return Err(format!("max_response_size must be >= {}", MIN_RESPONSE_SIZE));
        }

        if let Some(size) = self.socket_recv_buffer_size {
            if size < self.max_response_size {
                tracing::warn!(
                    "socket_recv_buffer_size ({}) is below max_response_size ({}), large responses may be dropped",
                    size,
                    self.max_response_size
                );
            }
        }

        Ok(())
    }
}
