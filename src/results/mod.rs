//! Presentation helpers for check results and directory rows
//!
//! This module provides functionality for:
//! - Deriving alive/dead/slow counts and average latency
//! - Sorting directory rows by freshness, delay, uptime or country
//! - Exporting to CSV, JSON, Clash and cURL

pub mod export;
pub mod stats;
pub mod table;

pub use export::{export_records, export_results, ExportFormat};
pub use stats::{ResultStats, SLOW_LATENCY_MS};
pub use table::{SortDirection, SortKey, SortState};
