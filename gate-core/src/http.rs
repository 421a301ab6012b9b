//! Minimal HTTP/1.1 codec for raw TCP sockets.
//!
//! The firmware speaks HTTP directly over a smoltcp socket: it writes the
//! bytes produced by [`Request::encode`] and hands whatever comes back to
//! [`parse_response`]. Every request uses `Connection: close`, so a response
//! ends either at `Content-Length` or when the server closes.

use alloc::string::String;
use core::fmt::Write as FmtWrite;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// One outbound request. `body` is sent as `application/json` when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub body: Option<&'a str>,
}

impl<'a> Request<'a> {
    pub fn get(path: &'a str) -> Self {
        Self {
            method: Method::Get,
            path,
            body: None,
        }
    }

    pub fn post_json(path: &'a str, body: &'a str) -> Self {
        Self {
            method: Method::Post,
            path,
            body: Some(body),
        }
    }

    /// Render the request for the wire, addressed to `host`.
    pub fn encode(&self, host: &str) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "{} {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Accept: application/json\r\n\
             Connection: close\r\n",
            self.method.as_str(),
            self.path,
            host
        );
        if let Some(body) = self.body {
            let _ = write!(
                out,
                "Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
        } else {
            out.push_str("\r\n");
        }
        out
    }
}

/// Parsed response. Only the headers the endpoint cares about are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub date: Option<String>,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("invalid server address: {0}")]
    InvalidAddress(String),
    #[error("connect failed")]
    Connect,
    #[error("send failed")]
    Send,
    #[error("response timeout")]
    Timeout,
    #[error("connection closed unexpectedly")]
    Closed,
    #[error("malformed response: {0}")]
    Malformed(&'static str),
}

/// Blocking request/response transport. Implementations bound every wait
/// with a timeout.
pub trait HttpClient {
    fn send(&mut self, request: &Request<'_>) -> Result<Response, HttpError>;
}

/// Position of the `\r\n\r\n` separating headers from body.
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse HTTP status code from the status line; 0 when absent or garbled.
pub fn parse_status_code(response: &str) -> u16 {
    // Format: "HTTP/1.1 200 OK\r\n..."
    response
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}

/// Extract header value (case-insensitive). Stops at the end of the headers.
pub fn extract_header<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    for line in response.lines().skip(1) {
        if line.is_empty() || line == "\r" {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case(name) {
                return Some(value.trim());
            }
        }
    }
    None
}

pub fn parse_content_length(header: &str) -> Option<usize> {
    extract_header(header, "content-length").and_then(|v| v.parse().ok())
}

/// True once `data` holds a complete response (headers plus the declared
/// body). Without a `Content-Length` the caller waits for the server to close.
pub fn is_complete(data: &[u8]) -> bool {
    let Some(header_end) = find_header_end(data) else {
        return false;
    };
    let Ok(header) = core::str::from_utf8(&data[..header_end]) else {
        return false;
    };
    match parse_content_length(header) {
        // An unrepresentable length is complete as far as waiting goes;
        // `parse_response` rejects it.
        Some(len) => body_end(header_end, len).map_or(true, |end| data.len() >= end),
        None => false,
    }
}

/// Offset one past the declared body, `None` on overflow.
fn body_end(header_end: usize, content_length: usize) -> Option<usize> {
    header_end.checked_add(4)?.checked_add(content_length)
}

/// Parse a complete raw response.
pub fn parse_response(data: &[u8]) -> Result<Response, HttpError> {
    let header_end = find_header_end(data).ok_or(HttpError::Malformed("no header terminator"))?;
    let header = core::str::from_utf8(&data[..header_end])
        .map_err(|_| HttpError::Malformed("bad header encoding"))?;

    let status = parse_status_code(header);
    if status == 0 {
        return Err(HttpError::Malformed("bad status line"));
    }

    let mut body = &data[header_end + 4..];
    if let Some(len) = parse_content_length(header) {
        if body_end(header_end, len).is_none() {
            return Err(HttpError::Malformed("content length out of range"));
        }
        if body.len() < len {
            return Err(HttpError::Malformed("truncated body"));
        }
        body = &body[..len];
    }
    let body = core::str::from_utf8(body).map_err(|_| HttpError::Malformed("bad body encoding"))?;

    Ok(Response {
        status,
        date: extract_header(header, "date").map(String::from),
        body: String::from(body),
    })
}

/// Parse an IPv4 address string without heap allocation.
pub fn parse_ipv4(s: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut octet_idx = 0;

    for part in s.split('.') {
        if octet_idx >= 4 {
            return None;
        }
        octets[octet_idx] = part.parse().ok()?;
        octet_idx += 1;
    }

    if octet_idx == 4 {
        Some(octets)
    } else {
        None
    }
}
