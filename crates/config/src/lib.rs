//! ut2query Configuration Management
//!
//! Loads client settings from a plain options file of `key = value` lines.
//!
//! ```text
//! # ut2query.txt
//! principalhost = ut2004master.epicgames.com
//! principalport = 28902
//! transport = udp
//! cdkey = XXXXX-XXXXX-XXXXX-XXXXX
//! timeoutms = 1500
//! filter = gametype,xDeathMatch
//! filter = currentplayers,0,>
//! ```
//!
//! Unknown keys are ignored and malformed values keep their defaults; both
//! are reported through `tracing` so a typo never stops a run.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use ut2query_network::SessionConfig;
use ut2query_protocol::{ClientIdentity, Filter, FilterOp, TextMode};

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Socket type used to reach the principal server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    Udp,
    Tcp,
}

impl TransportKind {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "udp" => Some(TransportKind::Udp),
            "tcp" => Some(TransportKind::Tcp),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Udp => write!(f, "udp"),
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// Complete client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Principal server host (from "principalhost" option)
    pub principal_host: String,
    /// Principal server port (from "principalport" option, default: 28902)
    pub principal_port: u16,
    /// Principal server transport (from "transport" option: udp or tcp)
    pub transport: TransportKind,

    // Identity presented when the principal server challenges
    /// CD key (from "cdkey" option)
    pub cd_key: String,
    /// Client name (from "clientname" option)
    pub client_name: String,
    /// Client version (from "clientversion" option)
    pub client_version: i64,

    // Session limits
    /// Per-attempt timeout in milliseconds (from "timeoutms" option)
    pub timeout_ms: u64,
    /// Sends per exchange (from "maxattempts" option)
    pub max_attempts: u32,

    /// Game servers queried at once (from "workers" option)
    pub workers: usize,
    /// Strip colour codes from server strings (from "stripcolors" option)
    pub strip_colors: bool,
    /// Server list filters (from repeated "filter" options)
    pub filters: Vec<Filter>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            principal_host: "ut2004master.epicgames.com".into(),
            principal_port: 28902,
            transport: TransportKind::Udp,
            cd_key: String::new(),
            client_name: "UT2K4CLIENT".into(),
            client_version: 3369,
            timeout_ms: 2000,
            max_attempts: 3,
            workers: 16,
            strip_colors: true,
            filters: vec![],
        }
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Parse `key,value[,operator]`
fn parse_filter(value: &str) -> Option<Filter> {
    let mut parts = value.splitn(3, ',').map(str::trim);
    let key = parts.next().filter(|k| !k.is_empty())?;
    let val = parts.next()?;
    let op = match parts.next() {
        Some(op) => FilterOp::parse(op)?,
        None => FilterOp::Equals,
    };
    Some(Filter::new(key, val).with_op(op))
}

impl ClientConfig {
    /// Load configuration from an options file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Load configuration, falling back to defaults when the file is unreadable
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Could not load {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse options file content
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some(eq_pos) = line.find('=') else {
                tracing::warn!("Line {}: expected key = value, got {:?}", index + 1, line);
                continue;
            };

            let key = line[..eq_pos].trim().to_ascii_lowercase();
            let value = line[eq_pos + 1..].trim();

            if let Err(e) = config.parse_option(&key, value) {
                tracing::warn!("Line {}: {}, keeping default", index + 1, e);
            }
        }

        config
    }

    fn parse_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "principalhost" => {
                if value.is_empty() {
                    return Err(invalid(key, value));
                }
                self.principal_host = value.into();
            }
            "principalport" => {
                self.principal_port = value.parse().map_err(|_| invalid(key, value))?;
            }
            "transport" => {
                self.transport = TransportKind::parse(value).ok_or_else(|| invalid(key, value))?;
            }
            "cdkey" => self.cd_key = value.into(),
            "clientname" => self.client_name = value.into(),
            "clientversion" => {
                self.client_version = value.parse().map_err(|_| invalid(key, value))?;
            }
            "timeoutms" => {
                self.timeout_ms = value.parse().map_err(|_| invalid(key, value))?;
            }
            "maxattempts" => {
                self.max_attempts = value.parse().map_err(|_| invalid(key, value))?;
            }
            "workers" => {
                self.workers = value.parse().map_err(|_| invalid(key, value))?;
            }
            "stripcolors" => {
                self.strip_colors = parse_bool(value).ok_or_else(|| invalid(key, value))?;
            }
            "filter" => {
                let filter = parse_filter(value).ok_or_else(|| invalid(key, value))?;
                self.filters.push(filter);
            }
            _ => {
                tracing::warn!("Unknown config option: {} = {}", key, value);
            }
        }
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Checks
    /// - `principalport` must be > 0
    /// - `workers` must be > 0
    /// - session limits must pass [`SessionConfig::validate`]
    pub fn validate(&self) -> Result<()> {
        if self.principal_port == 0 {
            return Err(ConfigError::Invalid("principalport must be > 0".into()));
        }

        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be > 0".into()));
        }

        self.session_config().validate().map_err(ConfigError::Invalid)?;

        if self.cd_key.is_empty() {
            tracing::warn!("No cdkey set, principal server challenges will be refused");
        }

        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(Duration::from_millis(self.timeout_ms), self.max_attempts)
    }

    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            cd_key: self.cd_key.clone(),
            name: self.client_name.clone(),
            version: self.client_version,
        }
    }

    pub fn text_mode(&self) -> TextMode {
        if self.strip_colors {
            TextMode::StripColors
        } else {
            TextMode::Raw
        }
    }

    /// Log a summary of the configuration
    pub fn display(&self) {
        tracing::info!("Client configuration:");
        tracing::info!(
            "  Principal: {}:{} ({})",
            self.principal_host,
            self.principal_port,
            self.transport
        );
        tracing::info!("  Client: {} v{}", self.client_name, self.client_version);
        tracing::info!(
            "  CD key: {}",
            if self.cd_key.is_empty() { "(none)" } else { "(set)" }
        );
        tracing::info!(
            "  Timeout: {} ms x {} attempts",
            self.timeout_ms,
            self.max_attempts
        );
        tracing::info!("  Workers: {}", self.workers);
        tracing::info!("  Strip colours: {}", self.strip_colors);
        for filter in &self.filters {
            tracing::info!("  Filter: {} {:?} {}", filter.key, filter.op, filter.value);
        }
    }
}
