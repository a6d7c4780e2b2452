//! Proxy module for parsing, validating and converting proxy lists
//!
//! This module provides functionality for:
//! - Parsing proxies from various formats (IP:PORT, IP:PORT:USER:PASS, etc.)
//! - Sorting pasted lists into valid, invalid and over-limit lines
//! - Converting proxy lists to URL, JSON, Clash and cURL formats

pub mod converter;
pub mod models;
pub mod parser;
pub mod validator;

pub use converter::{convert_proxies, Conversion, OutputFormat};
pub use models::{Proxy, ProxyAuth, ProxyResult, ProxyType};
pub use parser::ProxyParser;
pub use validator::{parse_proxy_lines, ParsedProxies, DEFAULT_PROXY_LIMIT};
