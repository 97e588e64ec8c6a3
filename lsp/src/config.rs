//! Lifecycle configuration types

use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

fn default_poll_interval_ms() -> u64 {
    25
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Tunables for request dispatch and result draining.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Interval between consumer-side cancellation and staleness checks while
    /// draining results, in milliseconds (default: 25)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-server request timeout in milliseconds (default: 30_000). A server
    /// that exceeds it fails in isolation; its siblings keep running.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl LifecycleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
