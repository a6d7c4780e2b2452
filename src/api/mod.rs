//! Client for the proxy-data REST API
//!
//! Cached endpoints go through one shared [`RequestCache`]: concurrent
//! identical requests collapse into one, and each endpoint keeps its
//! answer for its own TTL.

pub mod types;

pub use types::{
    AsnInfo, Envelope, FacetEntry, FacetKind, ProxyFilter, ProxyRecord, ProxyStats, WhoAmI,
};

use crate::cache::{canonical_key, RequestCache};
use crate::error::{ApiError, ApiResult};
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Default API base URL
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

fn recent_ttl() -> Duration {
    Duration::seconds(5)
}

fn proxies_ttl() -> Duration {
    Duration::seconds(30)
}

fn stats_ttl() -> Duration {
    Duration::seconds(60)
}

fn facets_ttl() -> Duration {
    Duration::minutes(5)
}

/// Proxy-data API client
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    cache: Arc<RequestCache<Value>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        Self::with_cache(base_url, Arc::new(RequestCache::new()))
    }

    /// Build a client on top of an existing cache
    pub fn with_cache(
        base_url: impl Into<String>,
        cache: Arc<RequestCache<Value>>,
    ) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("proxy-scan/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
        })
    }

    pub fn cache(&self) -> &Arc<RequestCache<Value>> {
        &self.cache
    }

    /// Proxy directory rows matching `filter`
    pub async fn proxies(&self, filter: &ProxyFilter) -> ApiResult<Envelope<Vec<ProxyRecord>>> {
        self.get_cached("/api/proxies", filter.to_params(), proxies_ttl())
            .await
    }

    pub async fn stats(&self) -> ApiResult<ProxyStats> {
        let envelope = self
            .get_cached("/api/proxies/stats", Vec::new(), stats_ttl())
            .await?;
        Ok(envelope.data)
    }

    /// Most recently seen proxies
    pub async fn recent(&self, limit: Option<u32>) -> ApiResult<Vec<ProxyRecord>> {
        let params = limit
            .map(|l| vec![("limit", l.to_string())])
            .unwrap_or_default();
        let envelope = self
            .get_cached("/api/proxies/recent", params, recent_ttl())
            .await?;
        Ok(envelope.data)
    }

    pub async fn random(&self, limit: Option<u32>) -> ApiResult<Vec<ProxyRecord>> {
        let params = limit
            .map(|l| vec![("limit", l.to_string())])
            .unwrap_or_default();
        let envelope = self
            .get_cached("/api/proxies/random", params, recent_ttl())
            .await?;
        Ok(envelope.data)
    }

    pub async fn facets(&self, kind: FacetKind) -> ApiResult<Vec<FacetEntry>> {
        let path = format!("/api/facets/{}", kind.path_segment());
        let envelope = self.get_cached(&path, Vec::new(), facets_ttl()).await?;
        Ok(envelope.data)
    }

    pub async fn asn(&self, asn: u32) -> ApiResult<AsnInfo> {
        let path = format!("/api/asn/{}", asn);
        let envelope = self.get_cached(&path, Vec::new(), facets_ttl()).await?;
        Ok(envelope.data)
    }

    /// Caller's own address as seen by the API; never cached
    pub async fn whoami(&self) -> ApiResult<WhoAmI> {
        let url = format!("{}/api/whoami", self.base_url);
        let value = fetch_json(self.client.clone(), url, Vec::new()).await?;
        let envelope: Envelope<WhoAmI> = serde_json::from_value(value)?;
        Ok(envelope.data)
    }

    async fn get_cached<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(&'static str, String)>,
        ttl: Duration,
    ) -> ApiResult<Envelope<T>> {
        let key = canonical_key(path, &params);
        let url = format!("{}{}", self.base_url, path);
        let client = self.client.clone();
        let cache = self.cache.clone();
        let store_key = key.clone();

        // Only the leading request writes the entry; hits and joined
        // callers leave its timestamp alone.
        let value = self
            .cache
            .dedupe(&key, move || async move {
                let value = fetch_json(client, url, params).await?;
                cache.set(&store_key, value.clone(), ttl);
                Ok::<Value, ApiError>(value)
            })
            .await?;

        serde_json::from_value(value).map_err(ApiError::from)
    }
}

async fn fetch_json(
    client: reqwest::Client,
    url: String,
    params: Vec<(&'static str, String)>,
) -> ApiResult<Value> {
    debug!(url = %url, ?params, "GET");
    let resp = client.get(&url).query(&params).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Http {
            status: status.as_u16(),
            message: body,
        });
    }

    Ok(resp.json::<Value>().await?)
}
