//! Outbound side of the bridge: parse the tool's stdout as a CGI response.
//!
//! Phase 1 ([`scan_headers`]) consumes `Name: value` lines up to the first empty line.
//! Phase 2 takes everything after that line as the body, byte for byte.

use super::CgiError;

const DEFAULT_STATUS: u16 = 200;

/// Headers the bridge never forwards: transport-level session negotiation stays with the gateway.
const DROPPED_HEADERS: [&str; 3] = ["vary", "cookie", "set-cookie"];

/// Ordered header set with case-insensitive names; a repeated name replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgiHeaders {
    entries: Vec<(String, String)>,
}

impl CgiHeaders {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parsed CGI response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiResponse {
    pub status: u16,
    pub headers: CgiHeaders,
    pub body: Vec<u8>,
}

/// Result of phase 1: status, forwarded headers, and where the body starts in the raw output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderScan {
    pub status: u16,
    pub headers: CgiHeaders,
    pub body_offset: usize,
}

/// Phase 1: scan the header block. Ends at the first line that is empty once line-ending
/// whitespace is trimmed; output without such a line is all headers and an empty body.
pub fn scan_headers(raw: &[u8]) -> Result<HeaderScan, CgiError> {
    let mut status = DEFAULT_STATUS;
    let mut headers = CgiHeaders::default();
    let mut pos = 0;

    while pos < raw.len() {
        let (line, next) = match raw[pos..].iter().position(|&b| b == b'\n') {
            Some(i) => (&raw[pos..pos + i], pos + i + 1),
            None => (&raw[pos..], raw.len()),
        };
        pos = next;

        let line = std::str::from_utf8(line)
            .map_err(|_| CgiError::Protocol("header line is not valid UTF-8".to_string()))?;
        if line.trim_end().is_empty() {
            return Ok(HeaderScan {
                status,
                headers,
                body_offset: pos,
            });
        }

        let line = line.strip_suffix('\r').unwrap_or(line);
        let (name, value) = line
            .split_once(": ")
            .ok_or_else(|| CgiError::Protocol(format!("header line without \": \": {:?}", line)))?;
        let value = value.trim();
        if name.eq_ignore_ascii_case("status") {
            status = parse_status(value);
        } else if !DROPPED_HEADERS
            .iter()
            .any(|d| name.eq_ignore_ascii_case(d))
        {
            headers.insert(name, value);
        }
    }

    Ok(HeaderScan {
        status,
        headers,
        body_offset: raw.len(),
    })
}

/// Leading integer token of a `Status` value (e.g. "404 Not Found"); 200 when absent or not a valid code.
fn parse_status(value: &str) -> u16 {
    value
        .split_whitespace()
        .next()
        .and_then(|t| t.parse::<u16>().ok())
        .filter(|c| (100..=999).contains(c))
        .unwrap_or(DEFAULT_STATUS)
}

/// Parse complete tool output: header scan, then the remainder verbatim as body.
pub fn parse_cgi_response(raw: &[u8]) -> Result<CgiResponse, CgiError> {
    let scan = scan_headers(raw)?;
    Ok(CgiResponse {
        status: scan.status,
        headers: scan.headers,
        body: raw[scan.body_offset..].to_vec(),
    })
}
