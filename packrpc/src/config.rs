//! Construction-time client configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::addr::Endpoint;
use crate::error::{Error, Result};

/// Default maximum bytes read from the socket per poll.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default connect and readiness-wait timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default debug log destination.
pub const DEFAULT_LOG_PATH: &str = "log/packrpc-client.log";

/// Client settings.
///
/// Build with [`Config::builder`], or load from JSON with [`Config::load`].
/// Missing JSON fields take their defaults:
///
/// ```json
/// { "address": "tcp://localhost:8000", "chunk_size": 1024, "timeout_secs": 30,
///   "debug": false, "log_path": "log/packrpc-client.log" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Config {
    /// Server address.
    pub address: Endpoint,
    /// Maximum bytes per socket read.
    pub chunk_size: usize,
    /// Bound on the connect attempt and on each readiness wait.
    #[serde(rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,
    /// Whether to append call-cycle events to `log_path`.
    pub debug: bool,
    /// Debug log file; only opened when `debug` is set.
    pub log_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: Endpoint::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
            debug: false,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }
}

impl Config {
    /// Returns a builder starting from the defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Loads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the call cycle cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Builder for [`Config`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// let config = packrpc::Config::builder()
///     .address("unix:///run/app/rpc.sock")
///     .chunk_size(4096)
///     .timeout(Duration::from_secs(5))
///     .build()
///     .expect("valid config");
/// assert_eq!(config.chunk_size, 4096);
/// ```
#[derive(Debug, Default)]
#[must_use = "a ConfigBuilder does nothing until .build() is called"]
pub struct ConfigBuilder {
    /// Unparsed server address.
    address: Option<String>,
    /// Maximum bytes per read.
    chunk_size: Option<usize>,
    /// Connect and poll timeout.
    timeout: Option<Duration>,
    /// Debug file logging toggle.
    debug: bool,
    /// Debug log path.
    log_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Sets the server address (default `tcp://localhost:8000`).
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the maximum bytes per socket read (default 1024).
    pub const fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = Some(bytes);
        self
    }

    /// Sets the connect and readiness-wait timeout (default 30 s).
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables appending call-cycle events to the debug log.
    pub const fn debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }

    /// Sets the debug log path (default `log/packrpc-client.log`).
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Parses the address and validates the result.
    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();
        let config = Config {
            address: match self.address {
                Some(a) => a.parse()?,
                None => defaults.address,
            },
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            debug: self.debug,
            log_path: self.log_path.unwrap_or(defaults.log_path),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Serializes a [`Duration`] as whole seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Writes the duration in seconds.
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    /// Reads a duration given in seconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
