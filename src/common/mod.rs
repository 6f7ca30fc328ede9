//! Small standalone helpers shared by [`crate::client`], [`crate::pool`] and
//! [`crate::conn`] that don't belong to any single one of them.

use crate::error::Error;

/// The `User-Agent` value this crate identifies itself with, unless the
/// caller's [`crate::client::Settings`] overrides it.
pub(crate) const DEFAULT_USER_AGENT: &str = concat!("corehttp/", env!("CARGO_PKG_VERSION"));

/// The scheme, host and port a request targets, and the pool/connection
/// cache key for it, keyed by scheme, host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Origin {
    pub(crate) is_tls: bool,
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl Origin {
    /// Extracts the origin from a parsed URL, defaulting the port from the
    /// scheme when the caller didn't specify one.
    pub(crate) fn from_uri(uri: &http::Uri) -> Result<Self, Error> {
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| Error::bad_url("URL is missing a scheme"))?;
        let is_tls = match scheme {
            "http" => false,
            "https" => true,
            other => return Err(Error::bad_url(format!("unsupported scheme: {other}"))),
        };
        let host = uri
            .host()
            .ok_or_else(|| Error::bad_url("URL is missing a host"))?
            .to_string();
        let port = uri.port_u16().unwrap_or(if is_tls { 443 } else { 80 });

        Ok(Self { is_tls, host, port })
    }

    /// The `host[:port]` authority this origin dials, omitting the port when
    /// it's the scheme's default (matches what browsers send in `Host`).
    pub(crate) fn host_header_value(&self) -> String {
        let default_port = if self.is_tls { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Selects a connection pool, keyed by `(host, port, TLS?, proxy settings,
/// client settings identity)`. `settings_id` distinguishes two
/// [`crate::client::Settings`] values that otherwise produce the same
/// `(origin, proxy)` pair but, say, disable HTTP/2 differently; it is the
/// `Settings`'s `Arc` address, cheap to compare and stable for the life of
/// that `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct OriginKey {
    pub(crate) origin: Origin,
    pub(crate) proxy: Option<Origin>,
    pub(crate) settings_id: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_port_from_scheme() {
        let uri: http::Uri = "https://example.org/a".parse().unwrap();
        let origin = Origin::from_uri(&uri).unwrap();
        assert!(origin.is_tls);
        assert_eq!(origin.port, 443);
        assert_eq!(origin.host_header_value(), "example.org");
    }

    #[test]
    fn explicit_port_is_kept_in_host_header() {
        let uri: http::Uri = "http://example.org:8080/a".parse().unwrap();
        let origin = Origin::from_uri(&uri).unwrap();
        assert_eq!(origin.port, 8080);
        assert_eq!(origin.host_header_value(), "example.org:8080");
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let uri: http::Uri = "ftp://example.org/a".parse().unwrap();
        assert!(Origin::from_uri(&uri).is_err());
    }
}
