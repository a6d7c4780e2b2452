//! CSV, JSON, Clash and cURL exports of check results and directory rows

use crate::api::types::ProxyRecord;
use crate::proxy::converter::{render_proxies, OutputFormat};
use crate::proxy::models::{Proxy, ProxyResult, ProxyType};
use crate::Result;
use anyhow::Context;
use std::fmt;
use std::str::FromStr;

/// Column order of a bulk-check CSV export
pub const RESULT_CSV_HEADER: [&str; 8] = [
    "IP", "Port", "Protocol", "Status", "Latency", "Country", "Anonymity", "Error",
];

/// Column order of a directory CSV export
pub const RECORD_CSV_HEADER: [&str; 14] = [
    "ip",
    "port",
    "country_code",
    "country_name",
    "city",
    "region",
    "asn",
    "asn_name",
    "org",
    "protocols",
    "anonymity",
    "uptime",
    "delay_ms",
    "last_seen",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Clash,
    Curl,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Clash => "yaml",
            ExportFormat::Curl => "sh",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "clash" | "yaml" => Ok(ExportFormat::Clash),
            "curl" => Ok(ExportFormat::Curl),
            _ => Err(anyhow::anyhow!(
                "Invalid export format: {}. Use: csv, json, clash, curl",
                s
            )),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Clash => "clash",
            ExportFormat::Curl => "curl",
        };
        write!(f, "{}", name)
    }
}

fn write_csv<I>(header: &[&str], rows: I) -> Result<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to finish CSV export: {}", e))?;
    String::from_utf8(bytes).context("CSV export is not valid UTF-8")
}

/// Bulk-check results as CSV
pub fn results_to_csv(results: &[ProxyResult]) -> Result<String> {
    let rows = results.iter().map(|r| {
        vec![
            r.ip.clone(),
            r.port.to_string(),
            r.protocol.clone(),
            if r.status { "alive" } else { "dead" }.to_string(),
            r.latency.to_string(),
            r.country.clone().unwrap_or_default(),
            r.anonymity.clone().unwrap_or_default(),
            r.error.clone().unwrap_or_default(),
        ]
    });
    write_csv(&RESULT_CSV_HEADER, rows)
}

pub fn results_to_json(results: &[ProxyResult]) -> Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

/// Bulk-check results in `format`; Clash and cURL include live proxies only
pub fn export_results(results: &[ProxyResult], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => results_to_csv(results),
        ExportFormat::Json => results_to_json(results),
        ExportFormat::Clash | ExportFormat::Curl => {
            let proxies: Vec<Proxy> = results
                .iter()
                .filter(|r| r.is_alive())
                .map(|r| {
                    let proxy_type = r.protocol.parse().unwrap_or_default();
                    Proxy::new(r.ip.clone(), r.port, proxy_type)
                })
                .collect();
            render_proxies(&proxies, proxy_output_format(format))
        }
    }
}

/// Directory rows as CSV
pub fn records_to_csv(records: &[ProxyRecord]) -> Result<String> {
    let rows = records.iter().map(|r| {
        vec![
            r.ip.clone(),
            r.port.to_string(),
            r.country_code.clone().unwrap_or_default(),
            r.country_name.clone().unwrap_or_default(),
            r.city.clone().unwrap_or_default(),
            r.region.clone().unwrap_or_default(),
            r.asn.map(|a| a.to_string()).unwrap_or_default(),
            r.asn_name.clone().unwrap_or_default(),
            r.org.clone().unwrap_or_default(),
            r.protocols.join(";"),
            r.anonymity.clone().unwrap_or_default(),
            r.uptime.to_string(),
            r.delay_ms.to_string(),
            r.last_seen.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ]
    });
    write_csv(&RECORD_CSV_HEADER, rows)
}

/// Preferred protocol of a directory row: socks5, socks4, https, http
pub fn record_to_proxy(record: &ProxyRecord) -> Proxy {
    let offered: Vec<ProxyType> = record
        .protocols
        .iter()
        .filter_map(|p| p.parse().ok())
        .collect();

    let proxy_type = [
        ProxyType::Socks5,
        ProxyType::Socks4,
        ProxyType::Https,
        ProxyType::Http,
    ]
    .into_iter()
    .find(|t| offered.contains(t))
    .unwrap_or_default();

    Proxy::new(record.ip.clone(), record.port, proxy_type)
}

pub fn export_records(records: &[ProxyRecord], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => records_to_csv(records),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        ExportFormat::Clash | ExportFormat::Curl => {
            let proxies: Vec<Proxy> = records.iter().map(record_to_proxy).collect();
            render_proxies(&proxies, proxy_output_format(format))
        }
    }
}

fn proxy_output_format(format: ExportFormat) -> OutputFormat {
    match format {
        ExportFormat::Curl => OutputFormat::Curl,
        _ => OutputFormat::Clash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn korean_result() -> ProxyResult {
        let mut result = ProxyResult::alive("1.2.3.4", 1080, "socks5", 250);
        result.country = Some("Korea, South".to_string());
        result.anonymity = Some("elite".to_string());
        result
    }

    #[test]
    fn test_results_csv_header_and_quoting() {
        let csv = results_to_csv(&[korean_result()]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "IP,Port,Protocol,Status,Latency,Country,Anonymity,Error"
        );
        assert_eq!(
            lines.next().unwrap(),
            r#"1.2.3.4,1080,socks5,alive,250,"Korea, South",elite,"#
        );
    }

    #[test]
    fn test_csv_escapes_quotes_and_newlines() {
        let mut result = ProxyResult::dead("5.6.7.8", 80, "http", "bad \"gateway\"\nretry");
        result.country = Some("Plain".to_string());
        let csv = results_to_csv(&[result]).unwrap();
        assert!(csv.contains(",Plain,,"));
        assert!(csv.contains("\"bad \"\"gateway\"\"\nretry\""));
    }

    #[test]
    fn test_results_json_round_trips() {
        let json = results_to_json(&[korean_result()]).unwrap();
        let back: Vec<ProxyResult> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![korean_result()]);
    }

    #[test]
    fn test_clash_export_skips_dead_results() {
        let results = vec![
            korean_result(),
            ProxyResult::dead("9.9.9.9", 80, "http", "timeout"),
        ];
        let yaml = export_results(&results, ExportFormat::Clash).unwrap();
        assert_eq!(yaml.matches("server:").count(), 1);
        assert!(yaml.contains("type: socks5"));
    }

    #[test]
    fn test_records_csv_column_order() {
        let record = ProxyRecord {
            ip: "1.1.1.1".into(),
            port: 4145,
            country_code: Some("KR".into()),
            country_name: Some("Korea, South".into()),
            city: Some("Seoul".into()),
            region: None,
            asn: Some(4766),
            asn_name: Some("KT".into()),
            org: None,
            protocols: vec!["socks4".into(), "socks5".into()],
            anonymity: Some("anonymous".into()),
            uptime: 99.5,
            delay_ms: 410,
            last_seen: None,
        };

        let csv = records_to_csv(&[record]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), RECORD_CSV_HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            r#"1.1.1.1,4145,KR,"Korea, South",Seoul,,4766,KT,,socks4;socks5,anonymous,99.5,410,"#
        );
    }

    #[test]
    fn test_record_prefers_socks5() {
        let mut record: ProxyRecord =
            serde_json::from_str(r#"{"ip":"2.2.2.2","port":443,"protocols":["http","https"]}"#).unwrap();
        assert_eq!(record_to_proxy(&record).proxy_type, ProxyType::Https);

        record.protocols.push("socks5".into());
        assert_eq!(record_to_proxy(&record).proxy_type, ProxyType::Socks5);

        let curl = export_records(&[record], ExportFormat::Curl).unwrap();
        assert!(curl.starts_with("curl -x socks5://2.2.2.2:443"));
    }
}
