//! Gateway configuration, `<config>/gateway.yaml`.

use std::path::PathBuf;
use std::time::Duration;

use hiveot_authn::UserEntry;
use serde::{Deserialize, Serialize};

/// TLS port of the session protocol.
pub const DEFAULT_GATEWAY_PORT: u16 = 9883;
/// WSS port of the session protocol.
pub const DEFAULT_GATEWAY_WSS_PORT: u16 = 9884;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listening address of both listeners.
    pub address: String,
    pub port: u16,
    /// WebSocket port, 0 disables the WSS listener.
    pub wss_port: u16,
    pub wss_path: String,
    /// Serve plain TCP and WS without TLS. Local testing only.
    pub no_tls: bool,
    /// Resolver socket. Defaults to `<run>/resolver.socket`.
    pub resolver_socket: Option<PathBuf>,
    pub dial_timeout_ms: u64,
    pub access_token_validity_sec: u64,
    pub refresh_token_validity_sec: u64,
    /// Logins accepted by `Login`, with argon2id PHC hashes (`hubcli hashpw`).
    pub users: Vec<UserEntry>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: DEFAULT_GATEWAY_PORT,
            wss_port: DEFAULT_GATEWAY_WSS_PORT,
            wss_path: hiveot_runtime::transport::DEFAULT_WS_PATH.to_string(),
            no_tls: false,
            resolver_socket: None,
            dial_timeout_ms: 3000,
            access_token_validity_sec: 15 * 60,
            refresh_token_validity_sec: 7 * 24 * 3600,
            users: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn access_token_validity(&self) -> Duration {
        Duration::from_secs(self.access_token_validity_sec)
    }

    pub fn refresh_token_validity(&self) -> Duration {
        Duration::from_secs(self.refresh_token_validity_sec)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// `None` when the WSS listener is disabled.
    pub fn wss_listen_addr(&self) -> Option<String> {
        (self.wss_port > 0).then(|| format!("{}:{}", self.address, self.wss_port))
    }
}
