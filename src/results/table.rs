//! Client-side sorting of directory rows

use crate::api::types::ProxyRecord;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Most recently seen
    Freshness,
    Delay,
    Uptime,
    Country,
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "freshness" | "last_seen" => Ok(SortKey::Freshness),
            "delay" | "latency" => Ok(SortKey::Delay),
            "uptime" => Ok(SortKey::Uptime),
            "country" => Ok(SortKey::Country),
            _ => Err(anyhow::anyhow!(
                "Invalid sort key: {}. Use: freshness, delay, uptime, country",
                s
            )),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortKey::Freshness => "freshness",
            SortKey::Delay => "delay",
            SortKey::Uptime => "uptime",
            SortKey::Country => "country",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Current sort column and direction of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            key: SortKey::Freshness,
            direction: SortDirection::Descending,
        }
    }
}

impl SortState {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Same key flips the direction; a new key starts descending
    pub fn toggle(&mut self, key: SortKey) {
        if self.key == key {
            self.direction = self.direction.flipped();
        } else {
            self.key = key;
            self.direction = SortDirection::Descending;
        }
    }

    /// Stable sort of `records` by this state
    pub fn sort(&self, records: &mut [ProxyRecord]) {
        records.sort_by(|a, b| {
            let ordering = compare(self.key, a, b);
            match self.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
    }
}

fn compare(key: SortKey, a: &ProxyRecord, b: &ProxyRecord) -> Ordering {
    match key {
        SortKey::Freshness => a.last_seen.cmp(&b.last_seen),
        SortKey::Delay => a.delay_ms.cmp(&b.delay_ms),
        SortKey::Uptime => a.uptime.total_cmp(&b.uptime),
        SortKey::Country => country_label(a).cmp(&country_label(b)),
    }
}

fn country_label(record: &ProxyRecord) -> String {
    record
        .country_name
        .as_deref()
        .or(record.country_code.as_deref())
        .unwrap_or("")
        .to_lowercase()
}
