//! In-memory TTL cache with in-flight request deduplication
//!
//! Entries expire lazily on read. Once the cache grows past its capacity
//! the entry with the oldest *write* timestamp is evicted, regardless of
//! how recently it was read.

use crate::clock::{Clock, SystemClock};
use crate::error::ApiError;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use regex::Regex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Maximum number of cached entries
pub const MAX_CACHE_SIZE: usize = 100;

type PendingRequest<T> = Shared<BoxFuture<'static, Result<T, ApiError>>>;

/// A cached value with its write time and expiry
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Write order, breaks timestamp ties during eviction
    seq: u64,
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    pending: HashMap<String, (u64, PendingRequest<T>)>,
    next_seq: u64,
}

impl<T: Clone> Inner<T> {
    fn fresh(&mut self, key: &str, now: DateTime<Utc>) -> Option<T> {
        let expired = match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => return Some(entry.data.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.timestamp, entry.seq))
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            debug!(key = %key, "Evicting oldest cache entry");
            self.entries.remove(&key);
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Request cache shared by every API call of one client
pub struct RequestCache<T> {
    inner: Mutex<Inner<T>>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
}

impl<T> RequestCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                pending: HashMap::new(),
                next_seq: 0,
            }),
            clock,
            max_entries: MAX_CACHE_SIZE,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a fresh entry, dropping it if it has expired
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        self.lock().fresh(key, now)
    }

    /// Full entry for a key, including expired ones
    pub fn entry(&self, key: &str) -> Option<CacheEntry<T>> {
        self.lock().entries.get(key).cloned()
    }

    /// Store a value for `ttl`
    pub fn set(&self, key: &str, data: T, ttl: Duration) {
        let now = self.clock.now();
        let mut inner = self.lock();
        let seq = inner.next_seq();
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                timestamp: now,
                expires_at: now + ttl,
                seq,
            },
        );

        while inner.entries.len() > self.max_entries {
            inner.evict_oldest();
        }
    }

    /// Return the cached value, join an identical in-flight request, or
    /// start `fetch` and register it as in flight.
    ///
    /// The resolved value is not stored here; the leading `fetch` is
    /// expected to `set` it with the TTL of its endpoint, so a hit never
    /// rewrites an entry.
    pub async fn dedupe<F, Fut>(&self, key: &str, fetch: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (id, request) = {
            let now = self.clock.now();
            let mut inner = self.lock();

            if let Some(data) = inner.fresh(key, now) {
                debug!(key, "Cache hit");
                return Ok(data);
            }

            match inner.pending.get(key) {
                Some((id, request)) => {
                    debug!(key, "Joining in-flight request");
                    (*id, request.clone())
                }
                None => {
                    let id = inner.next_seq();
                    let request = fetch().boxed().shared();
                    inner
                        .pending
                        .insert(key.to_string(), (id, request.clone()));
                    (id, request)
                }
            }
        };

        let result = request.await;

        let mut inner = self.lock();
        if matches!(inner.pending.get(key), Some((pending_id, _)) if *pending_id == id) {
            inner.pending.remove(key);
        }

        result
    }

    /// Remove every key matching `pattern`; returns how many were removed.
    ///
    /// `pattern` is a regex, or a plain substring when it does not compile.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let regex = Regex::new(pattern).ok();
        let mut inner = self.lock();
        let before = inner.entries.len();

        inner.entries.retain(|key, _| match &regex {
            Some(re) => !re.is_match(key),
            None => !key.contains(pattern),
        });

        before - inner.entries.len()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of requests currently in flight
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }
}

impl<T> Default for RequestCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical cache key: path plus non-empty params sorted by name
pub fn canonical_key(path: &str, params: &[(&str, String)]) -> String {
    let mut params: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    if params.is_empty() {
        return path.to_string();
    }

    params.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(&b.1)));
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", path, query)
}
