//! `Content-Encoding: gzip`/`deflate` decompression, layered over whatever
//! framing ([`super::chunked`] or [`super::length`]) already determined body
//! extent.
//!
//! Uses `flate2`'s non-blocking, non-IO streaming API
//! ([`flate2::Decompress`]) rather than its `Read`-adapter wrappers: the
//! underlying body is an async [`BodyRead`], not a `std::io::Read`, so the
//! decoder is driven a buffer at a time instead of being handed ownership of
//! the stream.

use super::BodyRead;
use bytes::BytesMut;
use flate2::{Decompress, FlushDecompress, Status};
use std::io;

/// A content coding this core knows how to remove. Anything else is
/// rejected by the caller before construction as a fatal
/// [`crate::ErrorKind::UnsupportedEncoding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Deflate,
}

impl ContentCoding {
    /// Parses a single `Content-Encoding` token. `identity` and unknown
    /// tokens return `None`; the caller treats `None` for the token ladder
    /// as "pass the body through unmodified" only for `identity`, and as an
    /// error for anything else it doesn't recognize.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            t if t.eq_ignore_ascii_case("gzip") || t.eq_ignore_ascii_case("x-gzip") => {
                Some(Self::Gzip)
            }
            t if t.eq_ignore_ascii_case("deflate") => Some(Self::Deflate),
            _ => None,
        }
    }

    fn new_decompress(self) -> Decompress {
        match self {
            // the gzip container (header + trailer) is stripped by this
            // module before any bytes reach the decompressor; what's left is
            // a raw deflate stream, same as `zlib_header = false`.
            Self::Gzip => Decompress::new(false),
            // Most servers send a zlib-wrapped deflate stream despite the
            // RFC 2616 ambiguity; this matches what browsers accept.
            Self::Deflate => Decompress::new(true),
        }
    }
}

/// Input scratch size for pulling more compressed bytes from the inner
/// stream between decompression attempts.
const INPUT_CHUNK: usize = 8 * 1024;

/// Gzip container header parsing state, consumed once before any bytes
/// reach the raw deflate decompressor. `Decompress` has no notion of the
/// gzip header/trailer, only of zlib-wrapped or raw deflate streams
/// (RFC 1952 vs. RFC 1951), so this module strips the container itself.
#[derive(Default)]
enum GzipFraming {
    #[default]
    AwaitingHeader,
    InBody,
}

/// Decompresses a gzip or zlib-wrapped deflate stream incrementally.
pub struct Decoder<R> {
    inner: R,
    decompress: Decompress,
    coding: ContentCoding,
    framing: GzipFraming,
    pending_in: BytesMut,
    inner_eof: bool,
}

impl<R> Decoder<R> {
    pub fn new(inner: R, coding: ContentCoding) -> Self {
        Self {
            inner,
            decompress: coding.new_decompress(),
            coding,
            framing: GzipFraming::AwaitingHeader,
            pending_in: BytesMut::new(),
            inner_eof: false,
        }
    }

    /// Strips a complete RFC 1952 gzip header from the front of
    /// `pending_in`, if one is fully buffered yet. Returns `Ok(true)` once
    /// stripped (or immediately for non-gzip codings).
    fn strip_gzip_header_if_ready(&mut self) -> io::Result<bool> {
        if self.coding != ContentCoding::Gzip {
            return Ok(true);
        }
        const FEXTRA: u8 = 0b0000_0100;
        const FNAME: u8 = 0b0000_1000;
        const FCOMMENT: u8 = 0b0001_0000;
        const FHCRC: u8 = 0b0000_0010;

        let buf = &self.pending_in[..];
        if buf.len() < 10 {
            return Ok(false);
        }
        if buf[0] != 0x1f || buf[1] != 0x8b {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a gzip stream"));
        }
        let flags = buf[3];
        let mut pos = 10usize;

        if flags & FEXTRA != 0 {
            if buf.len() < pos + 2 {
                return Ok(false);
            }
            let xlen = u16::from_le_bytes([buf[pos], buf[pos + 1]]) as usize;
            pos += 2;
            if buf.len() < pos + xlen {
                return Ok(false);
            }
            pos += xlen;
        }
        if flags & FNAME != 0 {
            match buf[pos..].iter().position(|&b| b == 0) {
                Some(rel) => pos += rel + 1,
                None => return Ok(false),
            }
        }
        if flags & FCOMMENT != 0 {
            match buf[pos..].iter().position(|&b| b == 0) {
                Some(rel) => pos += rel + 1,
                None => return Ok(false),
            }
        }
        if flags & FHCRC != 0 {
            if buf.len() < pos + 2 {
                return Ok(false);
            }
            pos += 2;
        }

        let _ = self.pending_in.split_to(pos);
        self.framing = GzipFraming::InBody;
        Ok(true)
    }
}

impl<R: BodyRead> BodyRead for Decoder<R> {
    async fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pending_in.is_empty() && !self.inner_eof {
                let mut scratch = [0u8; INPUT_CHUNK];
                let n = self.inner.read(&mut scratch).await?;
                if n == 0 {
                    self.inner_eof = true;
                } else {
                    self.pending_in.extend_from_slice(&scratch[..n]);
                }
            }

            if matches!(self.framing, GzipFraming::AwaitingHeader) {
                let ready = self.strip_gzip_header_if_ready()?;
                if !ready {
                    if self.inner_eof {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "connection closed mid gzip header",
                        ));
                    }
                    continue;
                }
            }

            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            let flush = if self.inner_eof {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            let status = self
                .decompress
                .decompress(&self.pending_in, out, flush)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let consumed = (self.decompress.total_in() - before_in) as usize;
            let produced = (self.decompress.total_out() - before_out) as usize;
            let _ = self.pending_in.split_to(consumed);

            if produced > 0 {
                return Ok(produced);
            }

            match status {
                Status::StreamEnd => return Ok(0),
                Status::Ok | Status::BufError if self.inner_eof && self.pending_in.is_empty() => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "compressed stream ended before decoder signaled completion",
                    ));
                }
                _ => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn gzip_bytes(payload: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(payload).unwrap();
        enc.finish().unwrap()
    }

    fn deflate_bytes(payload: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(payload).unwrap();
        enc.finish().unwrap()
    }

    #[tokio::test]
    async fn decodes_gzip() {
        let payload = b"hello hello hello, the quick brown fox jumps over the lazy dog";
        let wire = gzip_bytes(payload);
        let mut decoder = Decoder::new(&wire[..], ContentCoding::Gzip);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn decodes_deflate() {
        let payload = b"lorem ipsum dolor sit amet, consectetur adipiscing elit";
        let wire = deflate_bytes(payload);
        let mut decoder = Decoder::new(&wire[..], ContentCoding::Deflate);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn parses_known_tokens_case_insensitively() {
        assert_eq!(ContentCoding::parse("GZIP"), Some(ContentCoding::Gzip));
        assert_eq!(ContentCoding::parse("Deflate"), Some(ContentCoding::Deflate));
        assert_eq!(ContentCoding::parse("br"), None);
        assert_eq!(ContentCoding::parse("identity"), None);
    }
}
