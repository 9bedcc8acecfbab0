// MIT License - Copyright (c) 2015-2017 Nikishin Alexander
// Rust translation

use std::time::Duration;

/// Configuration for connecting to an OBD adapter.
///
/// Immutable once a connection is constructed; one configuration per
/// connection instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Adapter host address (default: 192.168.0.10, the conventional
    /// address of WiFi OBD adapters)
    pub host: String,
    /// Adapter TCP port (default: 35000)
    pub port: u16,
    /// How long a request may wait for the terminator before it fails
    /// with `ObdError::RequestTimeout` (default: 500 ms — adapters are
    /// low-latency local-network devices)
    pub request_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.10".to_string(),
            port: 35000,
            request_timeout: Duration::from_millis(500),
        }
    }
}

impl ConnectionConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// The `host:port` address string used for the TCP connect.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ConnectionConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}
