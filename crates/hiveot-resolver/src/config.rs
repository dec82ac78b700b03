//! Resolver configuration, `<config>/resolver.yaml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Directory with the service sockets. Defaults to the run folder.
    pub socket_dir: Option<PathBuf>,
    pub dial_timeout_ms: u64,
    /// Periodic rescan, 0 disables it.
    pub scan_interval_ms: u64,
    /// Quiet time after a socket event before rescanning.
    pub debounce_ms: u64,
    /// Delay before retrying sockets that failed to dial.
    pub retry_delay_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            socket_dir: None,
            dial_timeout_ms: 3000,
            scan_interval_ms: 5000,
            debounce_ms: 50,
            retry_delay_ms: 300,
        }
    }
}

impl ResolverConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn scan_interval(&self) -> Option<Duration> {
        (self.scan_interval_ms > 0).then(|| Duration::from_millis(self.scan_interval_ms))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
