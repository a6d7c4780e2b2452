use super::Storage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

pub const LATENCY_THRESHOLD_KEY: &str = "socks5_latency_threshold";
pub const COUNTRY_FILTER_KEY: &str = "socks5_country_filter";
pub const THEME_KEY: &str = "theme";
pub const ANALYTICS_CONSENT_KEY: &str = "analytics_consent";

/// Latency threshold used when none is stored
pub const DEFAULT_LATENCY_THRESHOLD_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            _ => Err(anyhow::anyhow!(
                "Invalid theme: {}. Use: light, dark, system",
                s
            )),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        };
        write!(f, "{}", name)
    }
}

/// User preferences, one storage key each.
///
/// Reads fall back to defaults and writes only log on failure.
#[derive(Clone)]
pub struct Preferences {
    storage: Arc<dyn Storage>,
}

impl Preferences {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn latency_threshold(&self) -> u64 {
        self.read(LATENCY_THRESHOLD_KEY)
            .await
            .unwrap_or(DEFAULT_LATENCY_THRESHOLD_MS)
    }

    pub async fn set_latency_threshold(&self, ms: u64) {
        self.write(LATENCY_THRESHOLD_KEY, &ms).await;
    }

    /// Country code filter; `None` means all countries
    pub async fn country_filter(&self) -> Option<String> {
        self.read::<String>(COUNTRY_FILTER_KEY)
            .await
            .filter(|c| !c.is_empty())
    }

    pub async fn set_country_filter(&self, country: Option<&str>) {
        match country.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => self.write(COUNTRY_FILTER_KEY, &code.to_uppercase()).await,
            None => self.delete(COUNTRY_FILTER_KEY).await,
        }
    }

    pub async fn theme(&self) -> Theme {
        self.read(THEME_KEY).await.unwrap_or_default()
    }

    pub async fn set_theme(&self, theme: Theme) {
        self.write(THEME_KEY, &theme).await;
    }

    /// `None` until the user has answered
    pub async fn analytics_consent(&self) -> Option<bool> {
        self.read(ANALYTICS_CONSENT_KEY).await
    }

    pub async fn set_analytics_consent(&self, consent: bool) {
        self.write(ANALYTICS_CONSENT_KEY, &consent).await;
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.storage.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "Ignoring unreadable preference");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read preference");
                None
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize preference");
                return;
            }
        };
        if let Err(e) = self.storage.set(key, &raw).await {
            warn!(key, error = %e, "Failed to save preference");
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.storage.remove(key).await {
            warn!(key, error = %e, "Failed to remove preference");
        }
    }
}
