//! The shared request/response data model: method, version, status
//! taxonomy, and the `Request`/`Response` entities themselves.

use crate::header::HeaderMap;
use std::fmt;

/// HTTP request method.
///
/// Deliberately a closed enum rather than an open string: the set below is
/// what RFC 7231 plus the WebDAV extensions in common use require, and a
/// closed enum lets the H1 role layer and the H2 pseudo-header writer match
/// exhaustively instead of falling back to string comparisons per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum HttpMethod {
    Get,
    Head,
    Put,
    Post,
    Patch,
    Delete,
    Options,
    Trace,
    Connect,
    Copy,
    Lock,
    MkCol,
    Move,
    PropFind,
    PropPatch,
    Unlock,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
            Self::Copy => "COPY",
            Self::Lock => "LOCK",
            Self::MkCol => "MKCOL",
            Self::Move => "MOVE",
            Self::PropFind => "PROPFIND",
            Self::PropPatch => "PROPPATCH",
            Self::Unlock => "UNLOCK",
        }
    }

    /// Whether a request with this method is permitted to carry a body
    /// writer at all (`GET`/`HEAD` bodies are legal on the wire but this
    /// core never attaches one for them, matching common client behavior).
    #[must_use]
    pub fn has_default_body(self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`HttpMethod::parse`] for a token outside the supported set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidMethod;

impl fmt::Display for InvalidMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unrecognized HTTP method")
    }
}

impl std::error::Error for InvalidMethod {}

impl HttpMethod {
    pub fn parse(s: &str) -> Result<Self, InvalidMethod> {
        Ok(match s {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "PUT" => Self::Put,
            "POST" => Self::Post,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "OPTIONS" => Self::Options,
            "TRACE" => Self::Trace,
            "CONNECT" => Self::Connect,
            "COPY" => Self::Copy,
            "LOCK" => Self::Lock,
            "MKCOL" => Self::MkCol,
            "MOVE" => Self::Move,
            "PROPFIND" => Self::PropFind,
            "PROPPATCH" => Self::PropPatch,
            "UNLOCK" => Self::Unlock,
            _ => return Err(InvalidMethod),
        })
    }
}

/// HTTP protocol version negotiated or requested for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVersion {
    Http10,
    Http11,
    Http2,
}

impl HttpVersion {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
            Self::Http2 => "HTTP/2",
        }
    }

    #[must_use]
    pub fn is_http2(self) -> bool {
        matches!(self, Self::Http2)
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed HTTP status code together with its taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const SWITCHING_PROTOCOLS: Self = Self(101);
    pub const OK: Self = Self(200);
    pub const PROXY_AUTHENTICATION_REQUIRED: Self = Self(407);

    pub fn new(code: u16) -> Result<Self, InvalidStatusCode> {
        if (100..1000).contains(&code) {
            Ok(Self(code))
        } else {
            Err(InvalidStatusCode)
        }
    }

    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }

    #[must_use]
    pub fn is_informational(self) -> bool {
        (100..200).contains(&self.0)
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    #[must_use]
    pub fn is_redirection(self) -> bool {
        (300..400).contains(&self.0)
    }

    #[must_use]
    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.0)
    }

    #[must_use]
    pub fn is_server_error(self) -> bool {
        (500..600).contains(&self.0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidStatusCode;

impl fmt::Display for InvalidStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("status code out of range")
    }
}

impl std::error::Error for InvalidStatusCode {}

/// A client-facing request, mutable until its body writer is obtained.
///
/// Ownership: exclusively held by the caller within the scoped requester
/// callback ([`crate::client::request`]); it never escapes that callback.
pub struct Request {
    method: HttpMethod,
    target: String,
    version: HttpVersion,
    headers: HeaderMap,
    frozen: bool,
}

impl Request {
    #[must_use]
    pub fn new(method: HttpMethod, target: impl Into<String>, version: HttpVersion) -> Self {
        Self {
            method,
            target: target.into(),
            version,
            headers: HeaderMap::new(),
            frozen: false,
        }
    }

    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn set_target(&mut self, target: String) {
        self.target = target;
    }

    #[must_use]
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable header access. Per the freeze invariant this must only be
    /// called before the body writer is obtained; call sites that violate
    /// this are a programming error, caught in debug builds.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        debug_assert!(!self.frozen, "request headers mutated after body writer was obtained");
        &mut self.headers
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Marks the request frozen. Called by the connection driver the moment
    /// it hands the caller a body writer.
    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .finish()
    }
}

/// A response as seen by the caller's responder callback.
///
/// Invariant: once the body reader is obtained, it must be fully consumed
/// before the response is finalized, or the connection is considered
/// corrupt for reuse.
pub struct Response {
    version: HttpVersion,
    status: StatusCode,
    reason: String,
    headers: HeaderMap,
    body_obtained: bool,
}

impl Response {
    pub(crate) fn new(version: HttpVersion, status: StatusCode, reason: String, headers: HeaderMap) -> Self {
        Self {
            version,
            status,
            reason,
            headers,
            body_obtained: false,
        }
    }

    #[must_use]
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body_obtained(&self) -> bool {
        self.body_obtained
    }

    pub(crate) fn mark_body_obtained(&mut self) {
        self.body_obtained = true;
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("version", &self.version)
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_roundtrips_through_as_str() {
        for m in [
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::PropFind,
            HttpMethod::Unlock,
        ] {
            assert_eq!(HttpMethod::parse(m.as_str()).unwrap(), m);
        }
    }

    #[test]
    fn status_taxonomy() {
        assert!(StatusCode::new(101).unwrap().is_informational());
        assert!(StatusCode::OK.is_success());
        assert!(StatusCode::new(301).unwrap().is_redirection());
        assert!(StatusCode::new(404).unwrap().is_client_error());
        assert!(StatusCode::new(500).unwrap().is_server_error());
        assert!(StatusCode::new(407).unwrap().is_client_error());
    }

    #[test]
    fn request_freeze_is_observable() {
        let mut req = Request::new(HttpMethod::Get, "/", HttpVersion::Http11);
        assert!(!req.is_frozen());
        req.freeze();
        assert!(req.is_frozen());
    }
}
