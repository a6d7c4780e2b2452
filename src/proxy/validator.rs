//! Sanitising and bucketing of free-text proxy lists
//!
//! Every non-blank line ends up in exactly one bucket: `valid`, `invalid`
//! or `ignored` (well-formed but past the limit). Nothing here touches the
//! network.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Default number of proxies accepted per scan
pub const DEFAULT_PROXY_LIMIT: usize = 500;

/// `scheme://...`
static SCHEME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://\S+$").expect("Invalid scheme regex")
});

/// `host:port` with optional `:user:pass`
static HOST_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.\-]+:\d{1,5}(?::[^:\s]+:[^:\s]+)?$").expect("Invalid host:port regex")
});

static SQL_INJECTION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\bunion\s+(all\s+)?select\b|\bselect\s+.+\s+from\b|\b(drop|alter|truncate)\s+table\b|\binsert\s+into\b|\bdelete\s+from\b|'\s*(or|and)\s+'?\d|;\s*--|\bor\s+1\s*=\s*1\b|\bsleep\s*\(|\bbenchmark\s*\()",
    )
    .expect("Invalid SQL injection regex")
});

static SCRIPT_INJECTION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(<\s*/?\s*script|javascript\s*:|vbscript\s*:|data\s*:\s*text/html|\bon[a-z]+\s*=|<\s*(iframe|img|svg|object|embed|link|style)\b)",
    )
    .expect("Invalid script injection regex")
});

/// Classification of a proxy list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedProxies {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
    /// Well-formed lines past the limit, in input order
    pub ignored: Vec<String>,
}

impl ParsedProxies {
    /// Number of non-blank lines that were classified
    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len() + self.ignored.len()
    }
}

/// Remove control characters and surrounding whitespace
pub fn sanitize_line(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Whether a sanitized line has a proxy shape
pub fn has_proxy_shape(line: &str) -> bool {
    SCHEME_REGEX.is_match(line) || HOST_PORT_REGEX.is_match(line)
}

/// Whether a line trips one of the injection heuristics
pub fn looks_like_injection(line: &str) -> bool {
    SQL_INJECTION_REGEX.is_match(line) || SCRIPT_INJECTION_REGEX.is_match(line)
}

/// Whether a sanitized line would be accepted
pub fn is_valid_proxy_line(line: &str) -> bool {
    has_proxy_shape(line) && !looks_like_injection(line)
}

/// Split `text` into valid, invalid and ignored lines.
///
/// `limit` caps the valid bucket only; invalid lines never count toward it.
pub fn parse_proxy_lines(text: &str, limit: usize) -> ParsedProxies {
    let mut parsed = ParsedProxies::default();

    for line in text.lines().map(sanitize_line).filter(|l| !l.is_empty()) {
        if !is_valid_proxy_line(&line) {
            parsed.invalid.push(line);
        } else if parsed.valid.len() < limit {
            parsed.valid.push(line);
        } else {
            parsed.ignored.push(line);
        }
    }

    parsed
}
