//! WebSocket client with exponential back-off reconnection
//!
//! Used for one-shot request/reply exchanges. The bulk scan path
//! ([`crate::checker::ScanRunner`]) deliberately does not reconnect.

use crate::checker::runner::WsStream;
use crate::Result;
use anyhow::{anyhow, Context};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

const INITIAL_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 30_000;
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Back-off schedule for reconnect attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Retries after the first failed connect
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// `min(initial * 2^attempt, max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Reconnecting WebSocket client
#[derive(Debug, Clone)]
pub struct WsClient {
    url: String,
    policy: ReconnectPolicy,
}

impl WsClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Connect, retrying with back-off
    pub(crate) async fn connect(&self) -> Result<WsStream> {
        let mut attempt = 0;

        loop {
            match connect_async(self.url.as_str()).await {
                Ok((ws, _response)) => {
                    debug!(url = %self.url, attempt, "WebSocket connected");
                    return Ok(ws);
                }
                Err(e) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        url = %self.url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "WebSocket connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(anyhow!(
                        "Failed to connect to {} after {} attempts: {}",
                        self.url,
                        attempt + 1,
                        e
                    ));
                }
            }
        }
    }

    /// Send one JSON message and wait for the first JSON reply
    pub async fn request(&self, payload: &Value) -> Result<Value> {
        let mut ws = self.connect().await?;
        ws.send(Message::Text(payload.to_string().into())).await?;

        while let Some(frame) = ws.next().await {
            match frame? {
                Message::Text(text) => {
                    let _ = ws.close(None).await;
                    return serde_json::from_str(text.as_str())
                        .context("Invalid JSON reply from WebSocket server");
                }
                Message::Close(_) => break,
                _ => continue,
            }
        }

        Err(anyhow!("Connection to {} closed without a reply", self.url))
    }
}
