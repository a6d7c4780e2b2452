//! Proxy parser module for parsing proxies from various formats

use crate::proxy::models::{Proxy, ProxyType};
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

static URL_FORMAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(https?|socks4a?|socks5h?)://(?:([^:@]+):([^@]+)@)?([^:/@]+):(\d+)/?$")
        .expect("Invalid proxy URL regex")
});

static AUTH_AT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^:@]+):([^@]+)@([^:@]+):(\d+)$").expect("Invalid user:pass@host regex")
});

/// Result of parsing a block of text
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub proxies: Vec<Proxy>,
    /// Non-blank lines that did not parse
    pub rejected: Vec<String>,
}

/// Proxy parser for parsing proxies from strings and files
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line
    ///
    /// Supports formats:
    /// - IP:PORT
    /// - IP:PORT:USER:PASS
    /// - USER:PASS@IP:PORT
    /// - scheme://IP:PORT
    /// - scheme://USER:PASS@IP:PORT
    pub fn parse_line(line: &str, default_type: ProxyType) -> Option<Proxy> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        Self::parse_url_format(line)
            .or_else(|| Self::parse_auth_at_format(line, default_type))
            .or_else(|| Self::parse_colon_format(line, default_type))
    }

    /// Parse URL format proxy (e.g., http://ip:port or socks5://user:pass@ip:port)
    fn parse_url_format(line: &str) -> Option<Proxy> {
        let caps = URL_FORMAT_REGEX.captures(line)?;

        let proxy_type: ProxyType = caps[1].parse().ok()?;
        let host = caps[4].to_string();
        let port = Self::parse_port(&caps[5])?;

        match (caps.get(2), caps.get(3)) {
            (Some(user), Some(pass)) => Some(Proxy::with_auth(
                host,
                port,
                proxy_type,
                user.as_str().to_string(),
                pass.as_str().to_string(),
            )),
            _ => Some(Proxy::new(host, port, proxy_type)),
        }
    }

    /// Parse user:pass@ip:port format
    fn parse_auth_at_format(line: &str, default_type: ProxyType) -> Option<Proxy> {
        let caps = AUTH_AT_REGEX.captures(line)?;

        let username = caps[1].to_string();
        let password = caps[2].to_string();
        let host = caps[3].to_string();
        let port = Self::parse_port(&caps[4])?;

        Some(Proxy::with_auth(host, port, default_type, username, password))
    }

    /// Parse ip:port or ip:port:user:pass format
    fn parse_colon_format(line: &str, default_type: ProxyType) -> Option<Proxy> {
        let parts: Vec<&str> = line.split(':').collect();
        if parts[0].is_empty() {
            return None;
        }

        match parts.len() {
            2 => {
                let port = Self::parse_port(parts[1])?;
                Some(Proxy::new(parts[0].to_string(), port, default_type))
            }
            4 => {
                let port = Self::parse_port(parts[1])?;
                Some(Proxy::with_auth(
                    parts[0].to_string(),
                    port,
                    default_type,
                    parts[2].to_string(),
                    parts[3].to_string(),
                ))
            }
            _ => None,
        }
    }

    /// Port 0 is never a usable proxy port
    fn parse_port(s: &str) -> Option<u16> {
        s.parse::<u16>().ok().filter(|p| *p != 0)
    }

    /// Parse proxies from a string (multiple lines)
    pub fn parse_string(content: &str, default_type: ProxyType) -> Vec<Proxy> {
        content
            .lines()
            .filter_map(|line| Self::parse_line(line, default_type))
            .collect()
    }

    /// Parse proxies from a string, keeping the lines that failed
    pub fn parse_with_rejects(content: &str, default_type: ProxyType) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match Self::parse_line(trimmed, default_type) {
                Some(proxy) => outcome.proxies.push(proxy),
                None => outcome.rejected.push(trimmed.to_string()),
            }
        }

        outcome
    }

    /// Parse proxies from a file
    pub fn parse_file<P: AsRef<Path>>(path: P, default_type: ProxyType) -> Result<Vec<Proxy>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse_string(&content, default_type))
    }
}
