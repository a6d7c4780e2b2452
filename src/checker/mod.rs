//! Bulk proxy checking against the remote checking service
//!
//! This module provides functionality for:
//! - The scan session state machine (batching, pause/resume/stop)
//! - Running a session over a WebSocket connection
//! - A reconnecting WebSocket client for request/reply exchanges

pub mod reconnect;
pub mod runner;
pub mod session;

pub use reconnect::{ReconnectPolicy, WsClient};
pub use runner::{ScanControl, ScanController, ScanRunner};
pub use session::{Effect, ScanSession, ScanState, ServerMessage, SessionEvent};

use crate::proxy::validator::DEFAULT_PROXY_LIMIT;

/// Default checking service endpoint
pub const DEFAULT_CHECKER_URL: &str = "ws://127.0.0.1:8080/ws/check";

/// Configuration for bulk checks
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// WebSocket endpoint of the checking service
    pub ws_url: String,
    /// Maximum number of proxies sent in one scan
    pub proxy_limit: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_CHECKER_URL.to_string(),
            proxy_limit: DEFAULT_PROXY_LIMIT,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ws_url(mut self, url: String) -> Self {
        self.ws_url = url;
        self
    }

    pub fn with_proxy_limit(mut self, limit: usize) -> Self {
        self.proxy_limit = limit;
        self
    }

    pub fn runner(&self) -> ScanRunner {
        ScanRunner::new(self.ws_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checker_config_default() {
        let config = CheckerConfig::default();
        assert_eq!(config.ws_url, DEFAULT_CHECKER_URL);
        assert_eq!(config.proxy_limit, DEFAULT_PROXY_LIMIT);
    }

    #[test]
    fn test_checker_config_builder() {
        let config = CheckerConfig::new()
            .with_ws_url("wss://checker.example.com/ws".to_string())
            .with_proxy_limit(50);

        assert_eq!(config.ws_url, "wss://checker.example.com/ws");
        assert_eq!(config.proxy_limit, 50);
        assert_eq!(config.runner().ws_url(), "wss://checker.example.com/ws");
    }
}
