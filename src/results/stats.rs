use crate::proxy::models::ProxyResult;
use serde::{Deserialize, Serialize};

/// Latency above which a live proxy counts as slow
pub const SLOW_LATENCY_MS: u64 = 1000;

/// Summary numbers derived from a result set.
///
/// Always recomputed from the results; never stored next to them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultStats {
    pub total: usize,
    pub alive: usize,
    pub dead: usize,
    /// Alive with latency over [`SLOW_LATENCY_MS`]
    pub slow: usize,
    /// Mean latency of alive proxies, rounded; 0 when none are alive
    pub avg_latency: u64,
}

impl ResultStats {
    pub fn from_results(results: &[ProxyResult]) -> Self {
        let alive: Vec<&ProxyResult> = results.iter().filter(|r| r.is_alive()).collect();
        let slow = alive.iter().filter(|r| r.latency > SLOW_LATENCY_MS).count();

        let avg_latency = if alive.is_empty() {
            0
        } else {
            let sum: u128 = alive.iter().map(|r| u128::from(r.latency)).sum();
            (sum as f64 / alive.len() as f64).round() as u64
        };

        Self {
            total: results.len(),
            alive: alive.len(),
            dead: results.len() - alive.len(),
            slow,
            avg_latency,
        }
    }
}
