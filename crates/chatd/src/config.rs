//! Server configuration.
//!
//! A [`ServerConfig`] is built once at startup and handed to
//! [`ChatServer::bind`](crate::server::ChatServer::bind). Sources are layered
//! by the binary: defaults, then an optional TOML file, then environment and
//! command-line overrides.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 8080;

/// Default number of worker threads
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Bytes requested per socket read. One read is one logical message.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Readiness events collected per poll cycle
pub const DEFAULT_EVENTS_CAPACITY: usize = 128;

/// Configuration for the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on (wildcard by default).
    pub bind_addr: IpAddr,

    /// TCP port. `0` picks an ephemeral port.
    pub port: u16,

    /// Number of worker threads executing accept and read tasks.
    pub pool_size: usize,

    /// Size of the buffer handed to each socket read.
    pub read_buffer_size: usize,

    /// Capacity of the readiness event buffer.
    pub events_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            pool_size: DEFAULT_POOL_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Loopback config on an ephemeral port, for tests and embedding.
    pub fn loopback() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Self::default()
        }
    }

    /// The socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Loads a config file and layers it over the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::default();
        config.apply(file);
        Ok(config)
    }

    /// Overrides fields present in `file`.
    pub fn apply(&mut self, file: FileConfig) {
        if let Some(bind_addr) = file.bind_addr {
            self.bind_addr = bind_addr;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(pool_size) = file.pool_size {
            self.pool_size = pool_size;
        }
        if let Some(read_buffer_size) = file.read_buffer_size {
            self.read_buffer_size = read_buffer_size;
        }
        if let Some(events_capacity) = file.events_capacity {
            self.events_capacity = events_capacity;
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".to_string()));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "read_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.events_capacity == 0 {
            return Err(ConfigError::Invalid(
                "events_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// On-disk form of [`ServerConfig`]; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind_addr: Option<IpAddr>,
    pub port: Option<u16>,
    pub pool_size: Option<usize>,
    pub read_buffer_size: Option<usize>,
    pub events_capacity: Option<usize>,
}

/// Errors that can occur while building a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
