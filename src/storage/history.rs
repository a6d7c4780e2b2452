use super::Storage;
use crate::clock::{Clock, SystemClock};
use crate::proxy::models::ProxyResult;
use crate::results::ResultStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Storage key of the serialized history list
pub const HISTORY_KEY: &str = "socks5_scan_history";

pub const MAX_HISTORY_ENTRIES: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total: usize,
    pub alive: usize,
    pub dead: usize,
    pub slow: usize,
}

impl From<ResultStats> for HistoryStats {
    fn from(stats: ResultStats) -> Self {
        Self {
            total: stats.total,
            alive: stats.alive,
            dead: stats.dead,
            slow: stats.slow,
        }
    }
}

/// One completed scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanHistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<ProxyResult>,
    pub stats: HistoryStats,
}

/// Newest-first list of past scans, mirrored to storage on every change
pub struct ScanHistory {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    entries: Vec<ScanHistoryEntry>,
}

impl ScanHistory {
    pub async fn load(storage: Arc<dyn Storage>) -> Self {
        Self::load_with_clock(storage, Arc::new(SystemClock)).await
    }

    /// Read the stored list; unreadable data yields an empty history
    pub async fn load_with_clock(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        let entries = match storage.get(HISTORY_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<ScanHistoryEntry>>(&raw) {
                Ok(mut entries) => {
                    entries.truncate(MAX_HISTORY_ENTRIES);
                    entries
                }
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable scan history");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load scan history");
                Vec::new()
            }
        };

        debug!(entries = entries.len(), "Loaded scan history");
        Self {
            storage,
            clock,
            entries,
        }
    }

    pub fn entries(&self) -> &[ScanHistoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ScanHistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a scan. Empty result sets are ignored.
    pub async fn add_entry(&mut self, results: Vec<ProxyResult>) -> Option<&ScanHistoryEntry> {
        if results.is_empty() {
            return None;
        }

        let entry = ScanHistoryEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: self.clock.now(),
            stats: ResultStats::from_results(&results).into(),
            results,
        };

        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY_ENTRIES);
        self.persist().await;
        self.entries.first()
    }

    /// Returns whether an entry was removed
    pub async fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.persist().await;
        }
        removed
    }

    pub async fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.storage.remove(HISTORY_KEY).await {
            warn!(error = %e, "Failed to clear stored scan history");
        }
    }

    async fn persist(&self) {
        let raw = match serde_json::to_string(&self.entries) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize scan history");
                return;
            }
        };
        if let Err(e) = self.storage.set(HISTORY_KEY, &raw).await {
            warn!(error = %e, "Failed to save scan history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStorage;
    use chrono::{Duration, TimeZone};

    fn results(n: u16) -> Vec<ProxyResult> {
        vec![ProxyResult::alive("10.0.0.1", n, "socks5", 100)]
    }

    #[tokio::test]
    async fn test_empty_results_are_ignored() {
        let storage = Arc::new(MemoryStorage::new());
        let mut history = ScanHistory::load(storage.clone()).await;

        assert!(history.add_entry(Vec::new()).await.is_none());
        assert!(history.is_empty());
        assert_eq!(storage.get(HISTORY_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_twenty_one_entries_keep_newest_twenty() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
        let mut history = ScanHistory::load_with_clock(storage.clone(), Arc::new(clock.clone())).await;

        for port in 1..=21 {
            history.add_entry(results(port)).await;
            clock.advance(Duration::seconds(1));
        }

        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history.entries()[0].results[0].port, 21);
        assert_eq!(history.entries()[19].results[0].port, 2);
        assert!(history.entries().iter().all(|e| e.results[0].port != 1));
        assert!(history.entries()[0].timestamp > history.entries()[1].timestamp);

        // A fresh load sees the same list
        let reloaded = ScanHistory::load(storage).await;
        assert_eq!(reloaded.entries(), history.entries());
    }

    #[tokio::test]
    async fn test_entry_stats_and_unique_ids() {
        let storage = Arc::new(MemoryStorage::new());
        let mut history = ScanHistory::load(storage).await;

        let entry = history
            .add_entry(vec![
                ProxyResult::alive("1.1.1.1", 80, "http", 1500),
                ProxyResult::dead("2.2.2.2", 80, "http", "timeout"),
            ])
            .await
            .cloned()
            .unwrap();
        assert_eq!(
            entry.stats,
            HistoryStats {
                total: 2,
                alive: 1,
                dead: 1,
                slow: 1
            }
        );

        history.add_entry(results(9)).await;
        assert_ne!(history.entries()[0].id, history.entries()[1].id);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let storage = Arc::new(MemoryStorage::new());
        let mut history = ScanHistory::load(storage.clone()).await;
        history.add_entry(results(1)).await;
        history.add_entry(results(2)).await;

        let id = history.entries()[1].id.clone();
        assert!(history.remove(&id).await);
        assert!(!history.remove(&id).await);
        assert_eq!(history.len(), 1);
        assert!(history.get(&id).is_none());

        history.clear().await;
        assert!(history.is_empty());
        assert_eq!(storage.get(HISTORY_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_failures_keep_memory_state() {
        let mut history = ScanHistory::load(Arc::new(MemoryStorage::failing())).await;
        history.add_entry(results(1)).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_stored_history_loads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(HISTORY_KEY, "{not json").await.unwrap();
        let history = ScanHistory::load(storage).await;
        assert!(history.is_empty());
    }
}
