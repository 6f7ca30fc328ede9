//! Known vs. unknown body length bookkeeping, and the length-limited reader
//! that enforces `Content-Length`.

use super::BodyRead;
use std::fmt;

/// The length of a body as determined from the framing headers, before any
/// content coding is applied.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct DecodedLength(u64);

const MAX_LEN: u64 = u64::MAX - 2;

impl DecodedLength {
    pub(crate) const CLOSE_DELIMITED: Self = Self(u64::MAX);
    pub(crate) const CHUNKED: Self = Self(u64::MAX - 1);
    pub(crate) const ZERO: Self = Self(0);

    pub(crate) fn exact(len: u64) -> Result<Self, crate::error::Error> {
        if len <= MAX_LEN {
            Ok(Self(len))
        } else {
            Err(crate::error::Error::protocol_h1("content-length exceeds maximum"))
        }
    }

    pub(crate) fn into_opt(self) -> Option<u64> {
        match self {
            Self::CHUNKED | Self::CLOSE_DELIMITED => None,
            Self(known) => Some(known),
        }
    }

    pub(crate) fn is_exact(self) -> bool {
        self.0 <= MAX_LEN
    }
}

impl fmt::Debug for DecodedLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::CLOSE_DELIMITED => f.write_str("CLOSE_DELIMITED"),
            Self::CHUNKED => f.write_str("CHUNKED"),
            Self(n) => write!(f, "Length({n})"),
        }
    }
}

/// Wraps a raw stream, yielding at most `remaining` bytes and then EOF,
/// enforcing `Content-Length: N`.
pub(crate) struct LengthLimited<R> {
    inner: R,
    remaining: u64,
}

impl<R> LengthLimited<R> {
    pub(crate) fn new(inner: R, len: u64) -> Self {
        Self { inner, remaining: len }
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: BodyRead> BodyRead for LengthLimited<R> {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let max = self.remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max]).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before content-length bytes were received",
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_exactly_at_content_length() {
        let data: &[u8] = b"hello world, extra garbage";
        let mut limited = LengthLimited::new(data, 5);
        let mut out = Vec::new();
        limited.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(limited.remaining(), 0);
    }

    #[tokio::test]
    async fn early_eof_is_an_error() {
        let data: &[u8] = b"hi";
        let mut limited = LengthLimited::new(data, 5);
        let mut buf = [0u8; 8];
        limited.read(&mut buf).await.unwrap();
        let err = limited.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
