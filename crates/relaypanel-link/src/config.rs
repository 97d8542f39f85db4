//! Agent link configuration

use std::time::Duration;

/// Default per-call deadline
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the TCP dial plus WebSocket upgrade
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed pause between reconnect attempts
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// WebSocket path of the agent API
pub const DEFAULT_AGENT_PATH: &str = "/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// How long `call` waits for a reply
    pub call_timeout: Duration,

    /// How long one dial may take before it counts as unreachable
    pub connect_timeout: Duration,

    /// Sleep between failed reconnect attempts. Retries are unbounded.
    pub reconnect_backoff: Duration,

    /// WebSocket path on the agent, e.g. "/api"
    pub path: String,
}

impl LinkConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            path: DEFAULT_AGENT_PATH.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect_backoff, Duration::from_secs(5));
        assert_eq!(config.path, "/api");
    }

    #[test]
    fn test_path_gets_leading_slash() {
        assert_eq!(LinkConfig::default().with_path("gost").path, "/gost");
        assert_eq!(LinkConfig::default().with_path("/v2").path, "/v2");
    }
}
