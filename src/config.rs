//! Connection settings.

use std::time::Duration;

/// Handshake timeout applied when none is configured explicitly.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Size of each transport read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 16 * 1024;

/// Client behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound on waiting for the handshake to complete. `None` waits
    /// indefinitely.
    pub handshake_timeout: Option<Duration>,
    /// Buffer size for each read from the transport.
    pub read_chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

/// Where to connect, plus the client settings to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// `host:port` passed to the TCP connect.
    pub addr: String,
    pub config: ClientConfig,
}

impl ConnectOptions {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            config: ClientConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }
}
