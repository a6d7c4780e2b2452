//! Proxy Scan - Free proxy directory client and bulk checker
//!
//! Validates pasted proxy lists, streams them to a remote checking
//! service over a WebSocket, and presents, exports and remembers the
//! results. Also browses the proxy directory API through a deduplicating
//! TTL cache.

pub mod api;
pub mod cache;
pub mod checker;
pub mod clock;
pub mod error;
pub mod proxy;
pub mod results;
pub mod storage;
pub mod tui;

pub use proxy::*;

use api::DEFAULT_API_URL;
use checker::{CheckerConfig, DEFAULT_CHECKER_URL};

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Proxy directory API base URL
    pub api_url: String,
    /// Checking service WebSocket endpoint
    pub checker_ws_url: String,
    /// SQLite database for history and preferences
    pub database_url: String,
    /// Maximum number of proxies per scan
    pub proxy_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            checker_ws_url: DEFAULT_CHECKER_URL.to_string(),
            database_url: "sqlite://proxy-scan.db".to_string(),
            proxy_limit: DEFAULT_PROXY_LIMIT,
        }
    }
}

impl Config {
    /// Defaults overridden by `PROXY_API_URL`, `CHECKER_WS_URL`,
    /// `DATABASE_URL` and `PROXY_LIMIT` (a `.env` file is read first)
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("PROXY_API_URL") {
            config.api_url = url;
        }
        if let Some(url) = lookup("CHECKER_WS_URL") {
            config.checker_ws_url = url;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(limit) = lookup("PROXY_LIMIT") {
            config.proxy_limit = limit
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PROXY_LIMIT {:?}: {}", limit, e))?;
        }

        Ok(config)
    }

    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = url;
        self
    }

    pub fn with_checker_ws_url(mut self, url: String) -> Self {
        self.checker_ws_url = url;
        self
    }

    pub fn with_database_url(mut self, url: String) -> Self {
        self.database_url = url;
        self
    }

    pub fn with_proxy_limit(mut self, limit: usize) -> Self {
        self.proxy_limit = limit;
        self
    }

    pub fn checker(&self) -> CheckerConfig {
        CheckerConfig::new()
            .with_ws_url(self.checker_ws_url.clone())
            .with_proxy_limit(self.proxy_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_from_lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("CHECKER_WS_URL", "wss://checker.example.com/ws"),
            ("PROXY_LIMIT", "50"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.checker_ws_url, "wss://checker.example.com/ws");
        assert_eq!(config.proxy_limit, 50);

        let checker = config.checker();
        assert_eq!(checker.ws_url, "wss://checker.example.com/ws");
        assert_eq!(checker.proxy_limit, 50);
    }

    #[test]
    fn test_config_rejects_bad_limit() {
        let err = Config::from_lookup(|k| (k == "PROXY_LIMIT").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PROXY_LIMIT"));
    }

    #[test]
    fn test_config_builders() {
        let config = Config::default()
            .with_api_url("https://api.example.com".to_string())
            .with_database_url("sqlite::memory:".to_string())
            .with_proxy_limit(10);
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.proxy_limit, 10);
        assert_eq!(config.checker_ws_url, DEFAULT_CHECKER_URL);
    }
}
