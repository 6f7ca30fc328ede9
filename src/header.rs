//! A case-insensitive, insertion-order preserving header container.
//!
//! Lookup folds ASCII case, but both the original casing and the insertion
//! order of every field are retained so the wire serializer can reproduce
//! them byte-for-byte on the wire. Up to [`INLINE_CAPACITY`] entries
//! live inline in the map itself; a request or response with more fields
//! than that spills onto the heap transparently via [`SmallVec`](smallvec::SmallVec).
//!
//! Duplicate field names are allowed and preserved in order, which matters
//! for `Set-Cookie` and `Proxy-Authenticate`.

use bytes::Bytes;
use smallvec::SmallVec;
use std::fmt;

/// Number of header entries that fit inline before the map spills to the
/// heap. Chosen to cover the common case of a request/response head.
pub const INLINE_CAPACITY: usize = 64;

/// A validated, case-preserving header field name.
#[derive(Clone, Eq)]
pub struct HeaderName(Box<str>);

impl HeaderName {
    /// Validates and constructs a header name from its wire representation.
    ///
    /// Field names must be non-empty ASCII tokens (RFC 7230 `token`): no
    /// separators, no whitespace, no control characters.
    pub fn parse(name: &str) -> Result<Self, InvalidHeaderName> {
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(InvalidHeaderName);
        }
        Ok(Self(name.into()))
    }

    /// Name exactly as it will be written on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn eq_ignore_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

fn is_token_byte(b: u8) -> bool {
    matches!(b, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
        || b.is_ascii_alphanumeric()
}

impl PartialEq for HeaderName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Debug for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for HeaderName {
    type Error = InvalidHeaderName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Error returned when a header name fails RFC 7230 `token` validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidHeaderName;

impl fmt::Display for InvalidHeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid header name")
    }
}

impl std::error::Error for InvalidHeaderName {}

/// A header field value: raw bytes that must not contain a bare CR or LF.
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderValue(Bytes);

impl HeaderValue {
    pub fn parse(value: impl Into<Bytes>) -> Result<Self, InvalidHeaderValue> {
        let bytes = value.into();
        if bytes.iter().any(|&b| b == b'\r' || b == b'\n') {
            return Err(InvalidHeaderValue);
        }
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_str() {
            Some(s) => fmt::Debug::fmt(s, f),
            None => fmt::Debug::fmt(&self.0, f),
        }
    }
}

/// Error returned when a header value contains a bare CR or LF byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidHeaderValue;

impl fmt::Display for InvalidHeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("header value contains a raw CR or LF")
    }
}

impl std::error::Error for InvalidHeaderValue {}

impl TryFrom<&str> for HeaderValue {
    type Error = InvalidHeaderValue;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl TryFrom<String> for HeaderValue {
    type Error = InvalidHeaderValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(Bytes::from(value))
    }
}

type Entry = (HeaderName, HeaderValue);

/// Case-insensitive, order-preserving, append-on-insert header collection.
#[derive(Clone, Default)]
pub struct HeaderMap {
    entries: SmallVec<[Entry; INLINE_CAPACITY]>,
}

impl HeaderMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a field. Existing fields with the same name (case-insensitive)
    /// are left in place, so duplicates accumulate in insertion order.
    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        self.entries.push((name, value));
    }

    /// Removes every existing field with this name, then inserts the given
    /// value as the sole occurrence. Used for headers the core injects only
    /// "unless already present" — call [`HeaderMap::contains`] first instead
    /// of this when the caller's value should win.
    pub fn replace(&mut self, name: HeaderName, value: HeaderValue) {
        self.remove_all(name.as_str());
        self.insert(name, value);
    }

    /// First value for `name`, folding ASCII case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_case(name))
            .map(|(_, v)| v)
    }

    /// Every value for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HeaderValue> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_case(name))
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes and returns the first field matching `name`.
    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let idx = self.entries.iter().position(|(n, _)| n.eq_ignore_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    /// Removes every field matching `name`.
    pub fn remove_all(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_case(name));
    }

    /// Iterates fields in original insertion order with their original
    /// casing.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(n, v)| (n.as_str(), v)))
            .finish()
    }
}

/// Convenience macro-free helper: insert a `&'static str` name/value pair,
/// panicking on malformed input. Intended for core-internal call sites where
/// the literal is known-good, not for untrusted data.
pub(crate) fn insert_static(map: &mut HeaderMap, name: &'static str, value: impl Into<Bytes>) {
    let name = HeaderName::parse(name).expect("static header name is a valid token");
    let value = HeaderValue::parse(value.into()).expect("static header value has no CR/LF");
    map.insert(name, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_lookup_returns_first_match() {
        let mut map = HeaderMap::new();
        map.insert(HeaderName::parse("Content-Type").unwrap(), HeaderValue::parse("text/plain").unwrap());
        map.insert(HeaderName::parse("content-type").unwrap(), HeaderValue::parse("text/html").unwrap());

        assert_eq!(map.get("CONTENT-TYPE").unwrap().to_str(), Some("text/plain"));
        assert_eq!(map.get_all("content-type").count(), 2);
    }

    #[test]
    fn preserves_original_case_and_order() {
        let mut map = HeaderMap::new();
        map.insert(HeaderName::parse("X-Custom-Header").unwrap(), HeaderValue::parse("a").unwrap());
        map.insert(HeaderName::parse("Accept").unwrap(), HeaderValue::parse("b").unwrap());

        let names: Vec<&str> = map.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["X-Custom-Header", "Accept"]);
    }

    #[test]
    fn set_cookie_duplicates_all_survive() {
        let mut map = HeaderMap::new();
        map.insert(HeaderName::parse("Set-Cookie").unwrap(), HeaderValue::parse("a=1").unwrap());
        map.insert(HeaderName::parse("Set-Cookie").unwrap(), HeaderValue::parse("b=2").unwrap());
        let values: Vec<&str> = map.get_all("set-cookie").map(|v| v.to_str().unwrap()).collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }

    #[test]
    fn rejects_value_with_raw_crlf() {
        assert!(HeaderValue::parse(Bytes::from_static(b"evil\r\nInjected: true")).is_err());
    }

    #[test]
    fn rejects_invalid_name() {
        assert!(HeaderName::parse("bad name").is_err());
        assert!(HeaderName::parse("").is_err());
    }

    #[test]
    fn replace_removes_prior_duplicates() {
        let mut map = HeaderMap::new();
        map.insert(HeaderName::parse("Connection").unwrap(), HeaderValue::parse("keep-alive").unwrap());
        map.replace(HeaderName::parse("Connection").unwrap(), HeaderValue::parse("close").unwrap());
        assert_eq!(map.get_all("connection").count(), 1);
        assert_eq!(map.get("connection").unwrap().to_str(), Some("close"));
    }
}
