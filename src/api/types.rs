use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// `{ data, meta? }` wrapper around every API response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// One row of the proxy directory
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProxyRecord {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub asn: Option<u32>,
    #[serde(default)]
    pub asn_name: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub anonymity: Option<String>,
    /// Percentage of successful checks
    #[serde(default)]
    pub uptime: f64,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Filter for `/api/proxies`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyFilter {
    pub country: Option<String>,
    pub protocol: Option<String>,
    pub port: Option<u16>,
    pub anonymity: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub asn: Option<u32>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ProxyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_asn(mut self, asn: u32) -> Self {
        self.asn = Some(asn);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Query parameters, unset fields omitted
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let fields: [(&'static str, Option<String>); 9] = [
            ("country", self.country.clone()),
            ("protocol", self.protocol.clone()),
            ("port", self.port.map(|p| p.to_string())),
            ("anonymity", self.anonymity.clone()),
            ("city", self.city.clone()),
            ("region", self.region.clone()),
            ("asn", self.asn.map(|a| a.to_string())),
            ("limit", self.limit.map(|l| l.to_string())),
            ("offset", self.offset.map(|o| o.to_string())),
        ];

        fields
            .into_iter()
            .filter_map(|(name, value)| value.filter(|v| !v.is_empty()).map(|v| (name, v)))
            .collect()
    }
}

/// Aggregate directory statistics
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub alive: u64,
    #[serde(default)]
    pub countries: u64,
    #[serde(default)]
    pub avg_delay_ms: f64,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Facet dimensions of the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetKind {
    Countries,
    Ports,
    Protocols,
    Cities,
    Regions,
    Asns,
}

impl FacetKind {
    pub fn path_segment(&self) -> &'static str {
        match self {
            FacetKind::Countries => "countries",
            FacetKind::Ports => "ports",
            FacetKind::Protocols => "protocols",
            FacetKind::Cities => "cities",
            FacetKind::Regions => "regions",
            FacetKind::Asns => "asns",
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}

impl FromStr for FacetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "countries" | "country" => Ok(FacetKind::Countries),
            "ports" | "port" => Ok(FacetKind::Ports),
            "protocols" | "protocol" => Ok(FacetKind::Protocols),
            "cities" | "city" => Ok(FacetKind::Cities),
            "regions" | "region" => Ok(FacetKind::Regions),
            "asns" | "asn" => Ok(FacetKind::Asns),
            _ => Err(anyhow::anyhow!(
                "Invalid facet: {}. Use: countries, ports, protocols, cities, regions, asns",
                s
            )),
        }
    }
}

/// One facet bucket, e.g. a country with its proxy count
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FacetEntry {
    pub value: Value,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub count: u64,
}

impl FacetEntry {
    /// Value as plain text (strings unquoted)
    pub fn display_value(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Details of one autonomous system
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AsnInfo {
    pub asn: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub proxies: Vec<ProxyRecord>,
}

/// What the API sees of the caller
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhoAmI {
    pub ip: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub asn: Option<u32>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}
