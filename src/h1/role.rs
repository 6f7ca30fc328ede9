//! Request-line/header serialization and status-line/header parsing for
//! HTTP/1.x, plus the "headers injected unless already present" policy.

use crate::error::Error;
use crate::header::{HeaderMap, HeaderName, HeaderValue};
use crate::model::{HttpVersion, Request, StatusCode};

/// Maximum header fields `httparse` will parse out of a response head.
/// Mirrors the common "a response head this large is already hostile"
/// ceiling used by HTTP/1 implementations.
const MAX_HEADERS: usize = 128;

/// Injects `Host`, `User-Agent` and `Accept-Encoding` onto `req`, unless the
/// caller already set one, plus the appropriate `Connection`/
/// `Proxy-Connection` header for HTTP/1.x requests. HTTP/2 never gets a
/// `Connection`/`Proxy-Connection` header: RFC 7540 §8.1.2.2 forbids
/// connection-specific fields in HTTP/2 messages, and framing/keep-alive are
/// handled by the stream multiplexer instead.
pub(crate) fn inject_default_headers(
    req: &mut Request,
    host_header_value: &str,
    user_agent: &str,
    via_proxy: bool,
    version: HttpVersion,
) {
    let headers = req.headers_mut();

    if !headers.contains("host") {
        insert(headers, "Host", host_header_value);
    }
    if !headers.contains("user-agent") {
        insert(headers, "User-Agent", user_agent);
    }
    if !headers.contains("accept-encoding") {
        insert(headers, "Accept-Encoding", "gzip, deflate");
    }

    if version == HttpVersion::Http2 {
        return;
    }

    let connection_name = if via_proxy { "proxy-connection" } else { "connection" };
    if !headers.contains(connection_name) {
        let display_name = if via_proxy { "Proxy-Connection" } else { "Connection" };
        insert(headers, display_name, "keep-alive");
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    let name = HeaderName::parse(name).expect("static header name is a valid token");
    let value = HeaderValue::parse(value.to_string()).expect("injected header value has no CR/LF");
    headers.insert(name, value);
}

/// Serializes the request line and header block, terminated by the blank
/// line that precedes the body. `request_target` is either `path?query` or,
/// when forwarding through a proxy, the absolute URL.
pub(crate) fn serialize_request_head(req: &Request, request_target: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    let request_line = format!(
        "{} {} {}\r\n",
        req.method().as_str(),
        request_target,
        req.version().as_str()
    );
    out.extend_from_slice(request_line.as_bytes());
    for (name, value) in req.headers().iter() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// The parsed status line and header block of a response.
pub(crate) struct ResponseHead {
    pub version: HttpVersion,
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
    /// Number of bytes of `buf` the head occupied, so the caller can slice
    /// off whatever body bytes followed in the same read.
    pub consumed: usize,
}

/// Attempts to parse a complete status line + header block from the front
/// of `buf`. Returns `Ok(None)` when more bytes are needed.
pub(crate) fn parse_response_head(buf: &[u8]) -> Result<Option<ResponseHead>, Error> {
    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut header_storage);

    let status = parsed
        .parse(buf)
        .map_err(|e| Error::protocol_h1(format!("invalid status line or headers: {e}")))?;

    let consumed = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    let version = match parsed.version {
        Some(0) => HttpVersion::Http10,
        Some(1) => HttpVersion::Http11,
        _ => return Err(Error::protocol_h1("unsupported HTTP version in status line")),
    };
    let code = parsed
        .code
        .ok_or_else(|| Error::protocol_h1("status line missing status code"))?;
    let status_code =
        StatusCode::new(code).map_err(|_| Error::protocol_h1("status code out of range"))?;
    let reason = parsed.reason.unwrap_or("").to_string();

    let mut headers = HeaderMap::new();
    for h in parsed.headers.iter() {
        let name = HeaderName::parse(h.name)
            .map_err(|_| Error::protocol_h1("invalid header field name"))?;
        let value = HeaderValue::parse(bytes::Bytes::copy_from_slice(h.value))
            .map_err(|_| Error::protocol_h1("invalid header field value"))?;
        headers.insert(name, value);
    }

    Ok(Some(ResponseHead {
        version,
        status: status_code,
        reason,
        headers,
        consumed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpMethod, HttpVersion, Request};

    #[test]
    fn serializes_request_line_and_headers_in_order() {
        let mut req = Request::new(HttpMethod::Get, "/index", HttpVersion::Http11);
        req.headers_mut().insert(HeaderName::parse("Host").unwrap(), HeaderValue::parse("example.org").unwrap());
        let wire = serialize_request_head(&req, "/index");
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("GET /index HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.org\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn injects_defaults_without_overwriting_caller_values() {
        let mut req = Request::new(HttpMethod::Get, "/", HttpVersion::Http11);
        req.headers_mut().insert(HeaderName::parse("User-Agent").unwrap(), HeaderValue::parse("custom/1").unwrap());
        inject_default_headers(&mut req, "example.org", "corehttp/0.1", false, HttpVersion::Http11);

        assert_eq!(req.headers().get("user-agent").unwrap().to_str(), Some("custom/1"));
        assert_eq!(req.headers().get("host").unwrap().to_str(), Some("example.org"));
        assert_eq!(req.headers().get("connection").unwrap().to_str(), Some("keep-alive"));
    }

    #[test]
    fn proxy_connection_used_when_via_proxy() {
        let mut req = Request::new(HttpMethod::Get, "/", HttpVersion::Http11);
        inject_default_headers(&mut req, "example.org", "corehttp/0.1", true, HttpVersion::Http11);
        assert!(req.headers().get("proxy-connection").is_some());
        assert!(req.headers().get("connection").is_none());
    }

    #[test]
    fn http2_requests_get_no_connection_header() {
        let mut req = Request::new(HttpMethod::Get, "/", HttpVersion::Http2);
        inject_default_headers(&mut req, "example.org", "corehttp/0.1", false, HttpVersion::Http2);
        assert!(req.headers().get("connection").is_none());
        assert!(req.headers().get("proxy-connection").is_none());
        assert!(req.headers().get("host").is_some());
    }

    #[test]
    fn parses_status_line_and_headers() {
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let head = parse_response_head(wire).unwrap().unwrap();
        assert_eq!(head.status.as_u16(), 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(head.headers.get("content-length").unwrap().to_str(), Some("5"));
        assert_eq!(&wire[head.consumed..], b"hello");
    }

    #[test]
    fn partial_head_requests_more_bytes() {
        let wire = b"HTTP/1.1 200 OK\r\nContent-Len";
        assert!(parse_response_head(wire).unwrap().is_none());
    }
}
