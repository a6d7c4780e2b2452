//! Proxy list format conversion (plain, URL, JSON, Clash, cURL)

use crate::proxy::models::{Proxy, ProxyType};
use crate::proxy::parser::ProxyParser;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// URL used by generated cURL commands
pub const DEFAULT_CURL_TARGET: &str = "http://httpbin.org/ip";

/// Output format of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `ip:port[:user:pass]`
    Plain,
    /// `scheme://[user:pass@]ip:port`
    Url,
    Json,
    Clash,
    Curl,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "txt" => Ok(OutputFormat::Plain),
            "url" => Ok(OutputFormat::Url),
            "json" => Ok(OutputFormat::Json),
            "clash" | "yaml" => Ok(OutputFormat::Clash),
            "curl" => Ok(OutputFormat::Curl),
            _ => Err(anyhow::anyhow!(
                "Invalid output format: {}. Use: plain, url, json, clash, curl",
                s
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Plain => "plain",
            OutputFormat::Url => "url",
            OutputFormat::Json => "json",
            OutputFormat::Clash => "clash",
            OutputFormat::Curl => "curl",
        };
        write!(f, "{}", name)
    }
}

/// JSON shape of one converted proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonProxy {
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl From<&Proxy> for JsonProxy {
    fn from(proxy: &Proxy) -> Self {
        Self {
            ip: proxy.host.clone(),
            port: proxy.port,
            protocol: proxy.proxy_type.to_string(),
            username: proxy.auth.as_ref().map(|a| a.username.clone()),
            password: proxy.auth.as_ref().map(|a| a.password.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ClashConfig {
    proxies: Vec<ClashProxy>,
}

#[derive(Debug, Serialize)]
struct ClashProxy {
    name: String,
    #[serde(rename = "type")]
    proxy_type: &'static str,
    server: String,
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tls: Option<bool>,
}

impl From<&Proxy> for ClashProxy {
    fn from(proxy: &Proxy) -> Self {
        Self {
            name: format!("{}-{}-{}", proxy.proxy_type, proxy.host, proxy.port),
            proxy_type: proxy.proxy_type.clash_type(),
            server: proxy.host.clone(),
            port: proxy.port,
            username: proxy.auth.as_ref().map(|a| a.username.clone()),
            password: proxy.auth.as_ref().map(|a| a.password.clone()),
            tls: proxy.proxy_type.is_tls().then_some(true),
        }
    }
}

/// Output of [`convert_proxies`]
#[derive(Debug, Clone)]
pub struct Conversion {
    pub output: String,
    pub converted: usize,
    /// Lines that could not be parsed as a proxy
    pub rejected: Vec<String>,
}

/// Parse `input` line by line and render the proxies in `format`
pub fn convert_proxies(
    input: &str,
    format: OutputFormat,
    default_type: ProxyType,
) -> Result<Conversion> {
    let parsed = ProxyParser::parse_with_rejects(input, default_type);
    let output = render_proxies(&parsed.proxies, format)?;

    Ok(Conversion {
        output,
        converted: parsed.proxies.len(),
        rejected: parsed.rejected,
    })
}

/// Render already-parsed proxies in `format`
pub fn render_proxies(proxies: &[Proxy], format: OutputFormat) -> Result<String> {
    let output = match format {
        OutputFormat::Plain => join_lines(proxies.iter().map(|p| p.to_full_string())),
        OutputFormat::Url => join_lines(proxies.iter().map(|p| p.url())),
        OutputFormat::Json => {
            let items: Vec<JsonProxy> = proxies.iter().map(JsonProxy::from).collect();
            serde_json::to_string_pretty(&items)?
        }
        OutputFormat::Clash => to_clash_yaml(proxies)?,
        OutputFormat::Curl => join_lines(
            proxies
                .iter()
                .map(|p| to_curl_command(p, DEFAULT_CURL_TARGET)),
        ),
    };

    Ok(output)
}

/// Clash `proxies:` document, one list item per proxy
pub fn to_clash_yaml(proxies: &[Proxy]) -> Result<String> {
    let config = ClashConfig {
        proxies: proxies.iter().map(ClashProxy::from).collect(),
    };
    Ok(serde_yaml::to_string(&config)?)
}

/// cURL command that sends a request to `target` through `proxy`
pub fn to_curl_command(proxy: &Proxy, target: &str) -> String {
    format!("curl -x {} {}", proxy.url(), target)
}

fn join_lines(lines: impl Iterator<Item = String>) -> String {
    lines.collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_keeps_ip_and_port() {
        let input = "1.2.3.4:8080\n5.6.7.8:1080:user:pass";
        let conversion = convert_proxies(input, OutputFormat::Json, ProxyType::Socks5).unwrap();
        assert_eq!(conversion.converted, 2);

        let items: Vec<JsonProxy> = serde_json::from_str(&conversion.output).unwrap();
        for (item, line) in items.iter().zip(input.lines()) {
            let mut parts = line.split(':');
            assert_eq!(item.ip, parts.next().unwrap());
            assert_eq!(item.port.to_string(), parts.next().unwrap());
        }
        assert_eq!(items[1].username.as_deref(), Some("user"));
        assert_eq!(items[0].protocol, "socks5");
    }

    #[test]
    fn test_plain_and_url_formats() {
        let input = "http://9.9.9.9:3128\nuser:pw@8.8.8.8:1080";
        let plain = convert_proxies(input, OutputFormat::Plain, ProxyType::Socks5).unwrap();
        assert_eq!(plain.output, "9.9.9.9:3128\n8.8.8.8:1080:user:pw");

        let url = convert_proxies(input, OutputFormat::Url, ProxyType::Socks5).unwrap();
        assert_eq!(url.output, "http://9.9.9.9:3128\nsocks5://user:pw@8.8.8.8:1080");
    }

    #[test]
    fn test_clash_yaml_types_and_tls() {
        let proxies = vec![
            Proxy::new("1.1.1.1".into(), 1080, ProxyType::Socks5),
            Proxy::new("2.2.2.2".into(), 4145, ProxyType::Socks4),
            Proxy::new("3.3.3.3".into(), 443, ProxyType::Https),
        ];
        let yaml = to_clash_yaml(&proxies).unwrap();

        assert!(yaml.starts_with("proxies:"));
        assert!(yaml.contains("type: socks5"));
        assert!(yaml.contains("type: socks4"));
        assert!(yaml.contains("type: http"));
        assert_eq!(yaml.matches("tls: true").count(), 1);
        assert_eq!(yaml.matches("server:").count(), 3);
    }

    #[test]
    fn test_curl_command() {
        let proxy = Proxy::with_auth("4.4.4.4".into(), 8080, ProxyType::Http, "u".into(), "p".into());
        assert_eq!(
            to_curl_command(&proxy, "https://example.com"),
            "curl -x http://u:p@4.4.4.4:8080 https://example.com"
        );
    }

    #[test]
    fn test_rejected_lines_reported() {
        let conversion =
            convert_proxies("1.1.1.1:80\nnot a proxy", OutputFormat::Plain, ProxyType::Http).unwrap();
        assert_eq!(conversion.output, "1.1.1.1:80");
        assert_eq!(conversion.rejected, vec!["not a proxy".to_string()]);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("CLASH".parse::<OutputFormat>().unwrap(), OutputFormat::Clash);
        assert_eq!("txt".parse::<OutputFormat>().unwrap(), OutputFormat::Plain);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
