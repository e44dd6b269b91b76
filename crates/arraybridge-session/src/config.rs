use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Result, SessionError};

/// Default worker/transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default length of one cooperative poll slice.
pub const DEFAULT_POLL_SLICE: Duration = Duration::from_millis(100);

/// Default ceiling for client-mode connection attempts.
pub const DEFAULT_CONNECT_CEILING: Duration = Duration::from_secs(3600);

/// Default bound on waiting for a killed worker to exit.
pub const DEFAULT_KILL_WAIT: Duration = Duration::from_millis(500);

/// Which side of the loopback connection this process takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Bind a listener, pass its address to the worker, accept one connection.
    #[default]
    Server,
    /// The worker listens on `host:port`; connect to it.
    Client,
}

/// Session behavior configuration.
///
/// Durations are read from JSON as millisecond integers (`timeout_ms`,
/// `poll_slice_ms`, `connect_ceiling_ms`, `kill_wait_ms`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub mode: SessionMode,
    pub host: String,
    /// Zero binds an ephemeral port in server mode.
    pub port: u16,
    #[serde(rename = "timeout_ms", deserialize_with = "millis")]
    pub timeout: Duration,
    #[serde(rename = "poll_slice_ms", deserialize_with = "millis")]
    pub poll_slice: Duration,
    #[serde(rename = "connect_ceiling_ms", deserialize_with = "millis")]
    pub connect_ceiling: Duration,
    #[serde(rename = "kill_wait_ms", deserialize_with = "millis")]
    pub kill_wait: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Server,
            host: "127.0.0.1".to_string(),
            port: 0,
            timeout: DEFAULT_TIMEOUT,
            poll_slice: DEFAULT_POLL_SLICE,
            connect_ceiling: DEFAULT_CONNECT_CEILING,
            kill_wait: DEFAULT_KILL_WAIT,
        }
    }
}

impl SessionConfig {
    /// Load a config from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| SessionError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Parse a config from JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_slice(mut self, poll_slice: Duration) -> Self {
        self.poll_slice = poll_slice;
        self
    }

    pub fn with_connect_ceiling(mut self, connect_ceiling: Duration) -> Self {
        self.connect_ceiling = connect_ceiling;
        self
    }

    pub fn with_kill_wait(mut self, kill_wait: Duration) -> Self {
        self.kill_wait = kill_wait;
        self
    }

    /// Reject values that would make every poll loop spin or never run.
    pub fn validate(&self) -> Result<()> {
        if self.poll_slice.is_zero() {
            return Err(SessionError::Config("poll slice must be non-zero".into()));
        }
        if self.timeout.is_zero() {
            return Err(SessionError::Config("timeout must be non-zero".into()));
        }
        Ok(())
    }
}

fn millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
