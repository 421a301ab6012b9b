//! Unit tests for the raw-socket HTTP codec.

use gate_core::http::{
    extract_header, find_header_end, is_complete, parse_content_length, parse_ipv4,
    parse_response, parse_status_code, HttpError, Request,
};
use pretty_assertions::assert_eq;

// ============================================================================
// Status Code Parsing Tests
// ============================================================================

#[test]
fn test_parse_status_code_200() {
    let response = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n";
    assert_eq!(parse_status_code(response), 200);
}

#[test]
fn test_parse_status_code_401() {
    let response = "HTTP/1.1 401 Unauthorized\r\n\r\n";
    assert_eq!(parse_status_code(response), 401);
}

#[test]
fn test_parse_status_code_http10() {
    let response = "HTTP/1.0 200 OK\r\n\r\n";
    assert_eq!(parse_status_code(response), 200);
}

#[test]
fn test_parse_status_code_malformed() {
    assert_eq!(parse_status_code(""), 0);
    // Missing status code
    assert_eq!(parse_status_code("HTTP/1.1\r\n"), 0);
    // Non-numeric
    assert_eq!(parse_status_code("HTTP/1.1 ABC OK\r\n"), 0);
    assert_eq!(parse_status_code("garbage"), 0);
}

#[test]
fn test_parse_status_code_no_reason_phrase() {
    assert_eq!(parse_status_code("HTTP/1.1 204\r\n\r\n"), 204);
}

// ============================================================================
// Header Extraction Tests
// ============================================================================

#[test]
fn test_extract_header_case_insensitive() {
    let response = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n";
    assert_eq!(extract_header(response, "content-type"), Some("application/json"));
    assert_eq!(extract_header(response, "CONTENT-TYPE"), Some("application/json"));
}

#[test]
fn test_extract_header_date_with_colons() {
    let response = "HTTP/1.1 200 OK\r\nDate: Sat, 17 Oct 2026 04:00:00 GMT\r\n\r\n";
    assert_eq!(
        extract_header(response, "date"),
        Some("Sat, 17 Oct 2026 04:00:00 GMT")
    );
}

#[test]
fn test_extract_header_skips_status_line() {
    let response = "HTTP/1.1 200 OK\r\nX-A: 1\r\n\r\n";
    assert_eq!(extract_header(response, "HTTP/1.1 200 OK"), None);
    assert_eq!(extract_header(response, "x-a"), Some("1"));
}

#[test]
fn test_extract_header_stops_at_body() {
    let response = "HTTP/1.1 200 OK\r\nX-A: 1\r\n\r\nX-In-Body: nope";
    assert_eq!(extract_header(response, "X-In-Body"), None);
}

#[test]
fn test_extract_header_not_found() {
    let response = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n";
    assert_eq!(extract_header(response, "X-Not-Present"), None);
}

#[test]
fn test_parse_content_length() {
    assert_eq!(
        parse_content_length("HTTP/1.1 200 OK\r\nContent-Length: 42"),
        Some(42)
    );
    assert_eq!(parse_content_length("HTTP/1.1 200 OK\r\nContent-Length: x"), None);
    assert_eq!(parse_content_length("HTTP/1.1 200 OK"), None);
}

// ============================================================================
// Response Framing Tests
// ============================================================================

#[test]
fn test_find_header_end() {
    assert_eq!(find_header_end(b"HTTP/1.1 200 OK\r\n\r\nbody"), Some(15));
    assert_eq!(find_header_end(b"HTTP/1.1 200 OK\r\n"), None);
}

#[test]
fn test_is_complete_waits_for_declared_body() {
    let head = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\n";
    let mut data = head.to_vec();
    assert!(!is_complete(&data));
    data.extend_from_slice(b"ab");
    assert!(!is_complete(&data));
    data.extend_from_slice(b"cd");
    assert!(is_complete(&data));
}

#[test]
fn test_is_complete_without_length_waits_for_close() {
    assert!(!is_complete(b"HTTP/1.1 200 OK\r\n\r\nwhatever"));
}

#[test]
fn test_unrepresentable_content_length_is_rejected() {
    let raw = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\nabc",
        usize::MAX
    );

    assert!(is_complete(raw.as_bytes()));
    assert_eq!(
        parse_response(raw.as_bytes()),
        Err(HttpError::Malformed("content length out of range"))
    );
}

#[test]
fn test_parse_response_full() {
    let raw = b"HTTP/1.1 200 OK\r\n\
                Date: Sat, 17 Oct 2026 04:00:00 GMT\r\n\
                Content-Length: 15\r\n\r\n\
                {\"token\":\"abc\"}";
    let response = parse_response(raw).unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.date.as_deref(), Some("Sat, 17 Oct 2026 04:00:00 GMT"));
    assert_eq!(response.body, "{\"token\":\"abc\"}");
    assert!(response.is_success());
}

#[test]
fn test_parse_response_truncates_to_content_length() {
    let raw = b"HTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nokEXTRA";
    let response = parse_response(raw).unwrap();
    assert_eq!(response.body, "ok");
    assert_eq!(response.date, None);
}

#[test]
fn test_parse_response_body_until_close() {
    let raw = b"HTTP/1.1 404 Not Found\r\n\r\nmissing";
    let response = parse_response(raw).unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.body, "missing");
    assert!(!response.is_success());
}

#[test]
fn test_parse_response_errors() {
    assert_eq!(
        parse_response(b"HTTP/1.1 200 OK\r\n"),
        Err(HttpError::Malformed("no header terminator"))
    );
    assert_eq!(
        parse_response(b"garbage\r\n\r\n"),
        Err(HttpError::Malformed("bad status line"))
    );
    assert_eq!(
        parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort"),
        Err(HttpError::Malformed("truncated body"))
    );
}

// ============================================================================
// Request Encoding Tests
// ============================================================================

#[test]
fn test_encode_get() {
    let wire = Request::get("/api/wifi-credentials").encode("10.0.0.2");
    assert_eq!(
        wire,
        "GET /api/wifi-credentials HTTP/1.1\r\n\
         Host: 10.0.0.2\r\n\
         Accept: application/json\r\n\
         Connection: close\r\n\r\n"
    );
}

#[test]
fn test_encode_post_json() {
    let body = r#"{"a":1}"#;
    let wire = Request::post_json("/api/send-data", body).encode("10.0.0.2");
    assert!(wire.starts_with("POST /api/send-data HTTP/1.1\r\n"));
    assert!(wire.contains("Content-Type: application/json\r\n"));
    assert!(wire.contains("Content-Length: 7\r\n"));
    assert!(wire.ends_with("\r\n\r\n{\"a\":1}"));
}

// ============================================================================
// IPv4 Parsing Tests
// ============================================================================

#[test]
fn test_parse_ipv4_standard() {
    assert_eq!(parse_ipv4("192.168.1.100"), Some([192, 168, 1, 100]));
    assert_eq!(parse_ipv4("0.0.0.0"), Some([0, 0, 0, 0]));
    assert_eq!(parse_ipv4("255.255.255.255"), Some([255, 255, 255, 255]));
}

#[test]
fn test_parse_ipv4_invalid() {
    assert_eq!(parse_ipv4("192.168.1"), None);
    assert_eq!(parse_ipv4("192.168.1.1.1"), None);
    assert_eq!(parse_ipv4("256.0.0.1"), None);
    assert_eq!(parse_ipv4("a.b.c.d"), None);
    assert_eq!(parse_ipv4(""), None);
    assert_eq!(parse_ipv4("gate.example.com"), None);
}
