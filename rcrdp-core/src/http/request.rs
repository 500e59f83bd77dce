//! Minimal HTTP request parsing.
//!
//! A request is the line `METHOD PATH ...`, optionally followed by a
//! header block ending in a blank line, optionally followed by a body.
//! Only `GET` and `POST` are recognised.
//!
//! The body is whatever follows the header block in the single buffered
//! read; no `Content-Length` is honoured. Like a C string, the buffer
//! ends at the first NUL byte. Callers must send the whole request in one
//! write that fits the read ceiling; anything beyond it is truncated.

use std::fmt;

use crate::error::BridgeError;

/// Read ceiling for one request.
pub const MAX_REQUEST_SIZE: usize = 8192;
/// Longest accepted request line, excluding CRLF.
const MAX_REQUEST_LINE: usize = 511;
/// Longest stored path; longer paths are cut.
const MAX_PATH_LEN: usize = 255;
/// Header blocks this long or longer are not stored.
const MAX_HEADERS_LEN: usize = 1024;

/// Recognised request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

// ── HttpRequest ──────────────────────────────────────────────────

/// One parsed control-plane request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: Method,
    path: String,
    headers: String,
    body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Parse the bytes of a single read.
    pub fn parse(data: &[u8]) -> Result<Self, BridgeError> {
        let data = data.split(|&b| b == 0).next().unwrap_or_default();

        let line_end = find(data, b"\r\n")
            .ok_or(BridgeError::MalformedRequest("missing request line terminator"))?;
        if line_end > MAX_REQUEST_LINE {
            return Err(BridgeError::MalformedRequest("request line too long"));
        }
        let line = String::from_utf8_lossy(&data[..line_end]);

        let (method, rest) = if let Some(rest) = line.strip_prefix("GET ") {
            (Method::Get, rest)
        } else if let Some(rest) = line.strip_prefix("POST ") {
            (Method::Post, rest)
        } else {
            return Err(BridgeError::MalformedRequest("unsupported method"));
        };

        let path: String = rest
            .split_whitespace()
            .next()
            .ok_or(BridgeError::MalformedRequest("missing path"))?
            .chars()
            .take(MAX_PATH_LEN)
            .collect();

        let mut headers = String::new();
        let mut body = None;
        if let Some(headers_end) = find(data, b"\r\n\r\n") {
            if headers_end < MAX_HEADERS_LEN {
                headers = String::from_utf8_lossy(&data[..headers_end]).into_owned();
            }
            let rest = &data[headers_end + 4..];
            if method == Method::Post && !rest.is_empty() {
                body = Some(rest.to_vec());
            }
        }

        Ok(Self {
            method,
            path,
            headers,
            body,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.split("\r\n").skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then_some(value.trim())
        })
    }

    /// Declared `Content-Length`, if present and numeric. Informational
    /// only: the body is never sized from it.
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")?.parse().ok()
    }

    /// Body bytes of a `POST`, if any followed the header block.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Integer field `key` of a flat JSON body; 0 when absent.
    pub fn json_int(&self, key: &str) -> i64 {
        self.body
            .as_deref()
            .map_or(0, |body| parse_json_int(&String::from_utf8_lossy(body), key))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ── Body fields ──────────────────────────────────────────────────

/// Extract the integer following `"key":` in `json`.
///
/// Not a JSON parser: finds the literal `"key":`, skips spaces and tabs,
/// then reads an optionally signed run of digits. Anything unparsable
/// yields 0; overflow saturates.
pub fn parse_json_int(json: &str, key: &str) -> i64 {
    let needle = format!("\"{key}\":");
    let Some(pos) = json.find(&needle) else {
        return 0;
    };
    let rest = json[pos + needle.len()..].trim_start_matches([' ', '\t']);

    let (negative, digits) = match rest.as_bytes().first() {
        Some(b'-') => (true, &rest[1..]),
        Some(b'+') => (false, &rest[1..]),
        _ => (false, rest),
    };

    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
        });
    if negative { -value } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_request() {
        let req =
            HttpRequest::parse(b"GET /status HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.path(), "/status");
        assert_eq!(req.header("host"), Some("localhost"));
        assert!(req.body().is_none());
    }

    #[test]
    fn post_body_is_remainder_of_read() {
        let raw = b"POST /sendkey HTTP/1.1\r\nContent-Length: 99\r\n\r\n{\"flags\":1,\"code\":65}";
        let req = HttpRequest::parse(raw).unwrap();
        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.body(), Some(&b"{\"flags\":1,\"code\":65}"[..]));
        // The declared length is reported but not used.
        assert_eq!(req.content_length(), Some(99));
        assert_eq!(req.json_int("code"), 65);
    }

    #[test]
    fn get_body_is_ignored() {
        let req = HttpRequest::parse(b"GET /screen HTTP/1.1\r\n\r\nleftover").unwrap();
        assert!(req.body().is_none());
    }

    #[test]
    fn post_without_blank_line_has_no_body() {
        let req = HttpRequest::parse(b"POST /movemouse HTTP/1.1\r\nHost: x\r\n").unwrap();
        assert!(req.body().is_none());
        assert_eq!(req.header("host"), None);
    }

    #[test]
    fn body_stops_at_nul() {
        let req = HttpRequest::parse(b"POST /x HTTP/1.1\r\n\r\n{\"x\":1}\0{\"x\":2}").unwrap();
        assert_eq!(req.body(), Some(&b"{\"x\":1}"[..]));
    }

    #[test]
    fn rejects_unknown_method() {
        assert!(matches!(
            HttpRequest::parse(b"PUT /status HTTP/1.1\r\n\r\n"),
            Err(BridgeError::MalformedRequest(_))
        ));
    }

    #[test]
    fn rejects_missing_terminator_and_path() {
        assert!(HttpRequest::parse(b"GET /status HTTP/1.1").is_err());
        assert!(HttpRequest::parse(b"GET \r\n\r\n").is_err());
        assert!(HttpRequest::parse(b"").is_err());
    }

    #[test]
    fn rejects_overlong_request_line() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat_n(b'a', 600));
        raw.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        assert!(HttpRequest::parse(&raw).is_err());
    }

    #[test]
    fn long_path_is_truncated() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat_n(b'p', 300));
        raw.extend_from_slice(b"\r\n\r\n");
        let req = HttpRequest::parse(&raw).unwrap();
        assert_eq!(req.path().len(), MAX_PATH_LEN);
    }

    #[test]
    fn json_int_defaults_and_whitespace() {
        let body = r#"{"flags": 4096, "x":	100, "y": -5, "z": "7"}"#;
        assert_eq!(parse_json_int(body, "flags"), 4096);
        assert_eq!(parse_json_int(body, "x"), 100);
        assert_eq!(parse_json_int(body, "y"), -5);
        assert_eq!(parse_json_int(body, "z"), 0);
        assert_eq!(parse_json_int(body, "missing"), 0);
        assert_eq!(parse_json_int(r#"{"x" : 3}"#, "x"), 0);
    }

    #[test]
    fn json_int_stops_at_first_non_digit() {
        assert_eq!(parse_json_int(r#"{"code":65abc}"#, "code"), 65);
        assert_eq!(parse_json_int(r#"{"code":1.9}"#, "code"), 1);
    }
}
