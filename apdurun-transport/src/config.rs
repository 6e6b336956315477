//! Transport configuration.

use std::time::Duration;

/// Default device target (Ledger Nano S).
pub const DEFAULT_TARGET_ID: u32 = 0x3110_0002;

/// Default proxy host.
pub const DEFAULT_PROXY_ADDRESS: &str = "127.0.0.1";

/// Default proxy port.
pub const DEFAULT_PROXY_PORT: u16 = 9999;

/// Default per-exchange socket timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration for a script run.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Proxy host name or address.
    pub proxy_address: String,
    /// Proxy TCP port.
    pub proxy_port: u16,
    /// Socket read/write timeout. `None` blocks forever.
    pub timeout: Option<Duration>,
    /// Target identifier sent during the key exchange.
    pub target_id: u32,
    /// Print decrypted responses.
    pub apdu_log: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            proxy_address: DEFAULT_PROXY_ADDRESS.to_string(),
            proxy_port: DEFAULT_PROXY_PORT,
            timeout: Some(DEFAULT_TIMEOUT),
            target_id: DEFAULT_TARGET_ID,
            apdu_log: false,
        }
    }
}

impl TransportConfig {
    /// Create a configuration for a proxy endpoint.
    pub fn proxy(address: impl Into<String>, port: u16) -> Self {
        Self {
            proxy_address: address.into(),
            proxy_port: port,
            ..Self::default()
        }
    }

    /// Select the device target.
    pub fn with_target_id(mut self, target_id: u32) -> Self {
        self.target_id = target_id;
        self
    }

    /// Print decrypted responses as they arrive.
    pub fn with_apdu_log(mut self, enabled: bool) -> Self {
        self.apdu_log = enabled;
        self
    }

    /// Override the socket timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `host:port` for the proxy socket.
    pub fn proxy_endpoint(&self) -> String {
        format!("{}:{}", self.proxy_address, self.proxy_port)
    }
}
