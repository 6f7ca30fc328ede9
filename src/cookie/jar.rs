//! The [`CookieStore`] trait, the [`Cookie`] record it deals in, and the
//! domain-match predicate.

use std::time::{Duration, SystemTime};

/// A single cookie record as the jar stores it.
///
/// `expires` follows a dual convention: `None` in a search query means
/// "session cookies only", while a constructed [`Cookie`] that
/// is genuinely a session cookie (no `Expires`, no `Max-Age` on the wire)
/// stores `Some(UNIX_EPOCH)` — never `None` — so that an expiry filter of
/// "now" always keeps it. Call [`Cookie::is_session`] rather than comparing
/// `expires` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: Option<SystemTime>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    /// A cookie with neither `Expires` nor `Max-Age` on the wire is stored
    /// with the epoch sentinel rather than `None`; this is the read-side
    /// check for that state.
    #[must_use]
    pub fn is_session(&self) -> bool {
        matches!(self.expires, Some(t) if t == SystemTime::UNIX_EPOCH)
    }

    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        match self.expires {
            Some(t) if t == SystemTime::UNIX_EPOCH => false,
            Some(t) => t <= now,
            None => false,
        }
    }

    /// Parses a `Set-Cookie` header value. `host` supplies the default
    /// `Domain` when the attribute is absent.
    #[must_use]
    pub fn parse(host: &str, set_cookie: &str) -> Option<Self> {
        let mut parts = set_cookie.split(';').map(str::trim);
        let pair = parts.next()?;
        let (name, value) = pair.split_once('=')?;
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() {
            return None;
        }

        let mut domain = None;
        let mut path = None;
        let mut expires = None;
        let mut max_age = None;
        let mut secure = false;
        let mut http_only = false;

        for attr in parts {
            let (key, val) = attr.split_once('=').map_or((attr, ""), |(k, v)| (k, v));
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" => domain = Some(val.trim().to_string()),
                "path" => path = Some(val.trim().to_string()),
                "expires" => expires = httpdate::parse_http_date(val.trim()).ok(),
                "max-age" => max_age = val.trim().parse::<i64>().ok(),
                "secure" => secure = true,
                "httponly" => http_only = true,
                _ => {}
            }
        }

        let expires = if let Some(secs) = max_age {
            Some(if secs > 0 {
                SystemTime::now() + Duration::from_secs(secs as u64)
            } else {
                SystemTime::UNIX_EPOCH
            })
        } else if let Some(exp) = expires {
            Some(exp)
        } else {
            // session cookie: neither Expires nor Max-Age present.
            Some(SystemTime::UNIX_EPOCH)
        };

        Some(Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.unwrap_or_else(|| host.to_string()),
            path: path.unwrap_or_else(|| "/".to_string()),
            expires,
            secure,
            http_only,
        })
    }

    /// Renders as the `name=value; Domain=...; ...` line the file store
    /// persists, with only the applicable attributes present.
    #[must_use]
    pub fn to_line(&self) -> String {
        use std::fmt::Write as _;
        let mut line = format!("{}={}", self.name, self.value);
        let _ = write!(line, "; Domain={}", self.domain);
        let _ = write!(line, "; Path={}", self.path);
        let expires = self.expires.unwrap_or(SystemTime::UNIX_EPOCH);
        let _ = write!(line, "; Expires={}", httpdate::fmt_http_date(expires));
        if self.secure {
            line.push_str("; Secure");
        }
        if self.http_only {
            line.push_str("; HttpOnly");
        }
        line
    }

    /// Parses one persisted line back into a [`Cookie`]. The inverse of
    /// [`Cookie::to_line`].
    #[must_use]
    pub fn from_line(line: &str) -> Option<Self> {
        let mut parts = line.split(';').map(str::trim);
        let pair = parts.next()?;
        let (name, value) = pair.split_once('=')?;

        let mut domain = String::new();
        let mut path = String::from("/");
        let mut expires = None;
        let mut secure = false;
        let mut http_only = false;

        for attr in parts {
            let (key, val) = attr.split_once('=').map_or((attr, ""), |(k, v)| (k, v));
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" => domain = val.trim().to_string(),
                "path" => path = val.trim().to_string(),
                "expires" => expires = httpdate::parse_http_date(val.trim()).ok(),
                "secure" => secure = true,
                "httponly" => http_only = true,
                _ => {}
            }
        }

        Some(Self {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
            domain,
            path,
            expires: Some(expires.unwrap_or(SystemTime::UNIX_EPOCH)),
            secure,
            http_only,
        })
    }
}

/// Whether `cookie-domain` matches `host` under the `Domain` attribute's
/// matching rules.
#[must_use]
pub fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    if let Some(without_dot) = cookie_domain.strip_prefix('.') {
        let ends_with_domain = host.len() >= cookie_domain.len()
            && host[host.len() - cookie_domain.len()..].eq_ignore_ascii_case(cookie_domain);
        return ends_with_domain || host.eq_ignore_ascii_case(without_dot);
    }
    if cookie_domain.eq_ignore_ascii_case(host) {
        return true;
    }
    if let Some(rest) = host.strip_prefix("www.") {
        if rest.eq_ignore_ascii_case(cookie_domain) {
            return true;
        }
    }
    if let Some(rest) = cookie_domain.strip_prefix("www.") {
        if rest.eq_ignore_ascii_case(host) {
            return true;
        }
    }
    false
}

/// `cookie.path` is a path-prefix of `request_path`.
#[must_use]
pub fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == "/" || cookie_path == request_path {
        return true;
    }
    request_path
        .strip_prefix(cookie_path)
        .is_some_and(|rest| cookie_path.ends_with('/') || rest.starts_with('/'))
}

/// A storage-agnostic cookie jar, consumed by the client for `Cookie`/
/// `Set-Cookie` handling.
pub trait CookieStore: Send + Sync {
    /// Invokes `emit` once per cookie that should accompany a request to
    /// `host`/`path` over a connection whose TLS status is `is_tls`,
    /// filtered by domain match, path prefix, the secure flag, and expiry.
    fn get(&self, host: &str, path: &str, is_tls: bool, emit: &mut dyn FnMut(&str, &str));

    /// Parses and stores a `Set-Cookie` header value received from `host`.
    fn set(&self, host: &str, set_cookie: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_match_exact_and_dot_prefix() {
        assert!(domain_matches("example.org", "example.org"));
        assert!(domain_matches(".example.org", "example.org"));
        assert!(domain_matches(".example.org", "sub.example.org"));
        assert!(!domain_matches("example.org", "other.org"));
    }

    #[test]
    fn domain_match_www_variants() {
        assert!(domain_matches("example.org", "www.example.org"));
        assert!(domain_matches("www.example.org", "example.org"));
    }

    #[test]
    fn path_prefix_rules() {
        assert!(path_matches("/", "/anything"));
        assert!(path_matches("/foo", "/foo"));
        assert!(path_matches("/foo", "/foo/bar"));
        assert!(!path_matches("/foo", "/foobar"));
    }

    #[test]
    fn parse_session_cookie_has_epoch_sentinel() {
        let c = Cookie::parse("example.org", "sid=abc; Path=/").unwrap();
        assert!(c.is_session());
        assert_eq!(c.domain, "example.org");
    }

    #[test]
    fn parse_max_age_computes_future_expiry() {
        let c = Cookie::parse("example.org", "sid=abc; Max-Age=3600").unwrap();
        assert!(!c.is_session());
        assert!(c.expires.unwrap() > SystemTime::now());
    }

    #[test]
    fn line_roundtrip() {
        let c = Cookie::parse("example.org", "sid=abc; Path=/app; Secure; HttpOnly").unwrap();
        let line = c.to_line();
        let back = Cookie::from_line(&line).unwrap();
        assert_eq!(back.name, "sid");
        assert_eq!(back.path, "/app");
        assert!(back.secure);
        assert!(back.http_only);
    }
}
