//! Error and Result types.
//!
//! Each [`ErrorKind`] is fatal at a different scope (the call, the
//! connection, the stream). The `Display`
//! impl intentionally only describes this level of the error; use
//! [`std::error::Error::source`] to walk the cause chain.

use std::error::Error as StdError;
use std::fmt;

/// Result type returned throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Represents errors that can occur while establishing or driving a
/// connection, or while framing a request/response.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: ErrorKind,
    cause: Option<BoxError>,
}

/// Coarse-grained classification of what went wrong, and at what scope it is
/// fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Scheme not http/https, or missing host. Fatal for the call.
    BadUrl,
    /// DNS, TCP or TLS handshake failure. Fatal for the call; the pooled
    /// connection remains unusable and will be re-dialed on next acquisition.
    Connect,
    /// Malformed status line, header block or chunk framing. Fatal for the
    /// connection.
    ProtocolH1,
    /// HTTP/2 session terminated or stream refused. Fatal for the stream;
    /// the session may outlive it.
    ProtocolH2,
    /// A proxy returned 407. Carries a sub-reason.
    ProxyAuthRequired(ProxyAuthReason),
    /// Transfer-Encoding or Content-Encoding other than a supported coding.
    /// Fatal for the call; the connection may still be reusable if the head
    /// was fully parsed.
    UnsupportedEncoding,
    /// The caller's requester/responder callback returned an error or
    /// panicked. The connection is closed with reason "Internal error".
    UserHandler,
    /// A ping, connection or keep-alive timer fired.
    Timeout,
    /// An operation was attempted on a connection that is mid-request (a
    /// programming error in debug builds would have asserted already).
    Busy,
    /// The dispatch side of a connection is gone.
    Closed,
}

/// Why a 407 Proxy Authentication Required was returned, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProxyAuthReason {
    NoCredentials,
    WrongCredentials,
    Other,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            inner: Box::new(Inner { kind, cause: None }),
        }
    }

    #[inline]
    pub(crate) fn with<E: Into<BoxError>>(mut self, cause: E) -> Self {
        self.inner.cause = Some(cause.into());
        self
    }

    /// The classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Timeout)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Closed)
    }

    pub(crate) fn bad_url(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadUrl).with(msg.into())
    }

    pub(crate) fn connect<E: Into<BoxError>>(cause: E) -> Self {
        Self::new(ErrorKind::Connect).with(cause)
    }

    pub(crate) fn protocol_h1<E: Into<BoxError>>(cause: E) -> Self {
        Self::new(ErrorKind::ProtocolH1).with(cause)
    }

    pub(crate) fn protocol_h2<E: Into<BoxError>>(cause: E) -> Self {
        Self::new(ErrorKind::ProtocolH2).with(cause)
    }

    pub(crate) fn proxy_auth_required(reason: ProxyAuthReason) -> Self {
        Self::new(ErrorKind::ProxyAuthRequired(reason))
    }

    pub(crate) fn unsupported_encoding(coding: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedEncoding).with(coding.into())
    }

    pub(crate) fn user_handler<E: Into<BoxError>>(cause: E) -> Self {
        Self::new(ErrorKind::UserHandler).with(cause)
    }

    pub(crate) fn timeout(msg: &'static str) -> Self {
        Self::new(ErrorKind::Timeout).with(msg)
    }

    pub(crate) fn busy() -> Self {
        Self::new(ErrorKind::Busy)
    }

    pub(crate) fn closed() -> Self {
        Self::new(ErrorKind::Closed)
    }

    fn description(&self) -> &'static str {
        match self.inner.kind {
            ErrorKind::BadUrl => "invalid request URL",
            ErrorKind::Connect => "failed to establish connection",
            ErrorKind::ProtocolH1 => "malformed HTTP/1.x message",
            ErrorKind::ProtocolH2 => "HTTP/2 session or stream error",
            ErrorKind::ProxyAuthRequired(_) => "proxy authentication required",
            ErrorKind::UnsupportedEncoding => "unsupported transfer or content coding",
            ErrorKind::UserHandler => "request/response callback failed",
            ErrorKind::Timeout => "operation timed out",
            ErrorKind::Busy => "connection already has a request in flight",
            ErrorKind::Closed => "connection is closed",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("corehttp::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::connect(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_does_not_panic_for_every_kind() {
        let errs = [
            Error::bad_url("missing host"),
            Error::connect(std::io::Error::other("refused")),
            Error::protocol_h1("bad status line"),
            Error::protocol_h2("stream refused"),
            Error::proxy_auth_required(ProxyAuthReason::NoCredentials),
            Error::unsupported_encoding("br"),
            Error::user_handler("boom"),
            Error::timeout("keep-alive"),
            Error::busy(),
            Error::closed(),
        ];
        for err in errs {
            let _ = err.to_string();
        }
    }

    #[test]
    fn kind_roundtrips() {
        let err = Error::timeout("ping");
        assert!(err.is_timeout());
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
