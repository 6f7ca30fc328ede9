//! RFC 7230 §4.1 chunked transfer coding: a decoding input stream and an
//! encoding output stream.

use super::{BodyRead, BodyWrite};
use bytes::{BufMut, BytesMut};
use std::io;

/// Default flush threshold for [`ChunkedOutput`]: once this many bytes are
/// buffered, a chunk is emitted automatically.
pub const DEFAULT_FLUSH_BUFFER: usize = 512 * 1024;

enum ReadState {
    ChunkHeader,
    ChunkData(u64),
    ChunkDataCrlf,
    TrailerLine,
    Done,
}

/// Decodes a chunked-encoded byte stream into its logical payload.
///
/// Reads chunk headers (`hex CRLF`), exposes up to the declared chunk size
/// per read, consumes the trailing CRLF, then moves to the next header. A
/// zero-length chunk ends the body; any trailer lines up to the final blank
/// line are discarded.
pub struct ChunkedInput<R> {
    inner: R,
    buf: BytesMut,
    state: ReadState,
}

impl<R> ChunkedInput<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            state: ReadState::ChunkHeader,
        }
    }
}

fn malformed(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

impl<R: BodyRead> ChunkedInput<R> {
    /// Reads one line (without the trailing CRLF/LF) from the underlying
    /// stream, pulling more bytes as needed.
    async fn read_line(&mut self) -> io::Result<BytesMut> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line = self.buf.split_to(pos + 1);
                line.truncate(line.len() - 1); // drop \n
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(line);
            }
            let mut tmp = [0u8; 512];
            let n = self.inner.read(&mut tmp).await?;
            if n == 0 {
                return Err(malformed("connection closed mid chunk framing"));
            }
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }

    fn parse_chunk_size(line: &[u8]) -> io::Result<u64> {
        // chunk-size ["; " chunk-ext] — extensions are accepted and ignored.
        let size_part = match line.iter().position(|&b| b == b';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        if size_part.is_empty() {
            return Err(malformed("empty chunk size"));
        }
        let s = std::str::from_utf8(size_part).map_err(|_| malformed("non-hex chunk size"))?;
        u64::from_str_radix(s.trim(), 16).map_err(|_| malformed("non-hex chunk size"))
    }
}

impl<R: BodyRead> BodyRead for ChunkedInput<R> {
    async fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.state {
                ReadState::ChunkHeader => {
                    let line = self.read_line().await?;
                    let size = Self::parse_chunk_size(&line)?;
                    self.state = if size == 0 {
                        ReadState::TrailerLine
                    } else {
                        ReadState::ChunkData(size)
                    };
                }
                ReadState::ChunkData(0) => {
                    self.state = ReadState::ChunkDataCrlf;
                }
                ReadState::ChunkData(remaining) => {
                    if !self.buf.is_empty() {
                        let take = (remaining as usize).min(self.buf.len()).min(out.len());
                        out[..take].copy_from_slice(&self.buf[..take]);
                        let _ = self.buf.split_to(take);
                        self.state = ReadState::ChunkData(remaining - take as u64);
                        return Ok(take);
                    }
                    let take = (remaining as usize).min(out.len()).max(1);
                    let n = self.inner.read(&mut out[..take]).await?;
                    if n == 0 {
                        return Err(malformed("connection closed mid chunk data"));
                    }
                    self.state = ReadState::ChunkData(remaining - n as u64);
                    return Ok(n);
                }
                ReadState::ChunkDataCrlf => {
                    let line = self.read_line().await?;
                    if !line.is_empty() {
                        return Err(malformed("missing CRLF after chunk data"));
                    }
                    self.state = ReadState::ChunkHeader;
                }
                ReadState::TrailerLine => {
                    let line = self.read_line().await?;
                    if line.is_empty() {
                        self.state = ReadState::Done;
                    }
                    // non-empty trailer lines are discarded; loop reads the next one.
                }
                ReadState::Done => return Ok(0),
            }
        }
    }
}

/// Encodes a logical payload as chunked transfer coding.
///
/// Buffers writes up to `flush_at` bytes (default [`DEFAULT_FLUSH_BUFFER`]);
/// `flush_at == 0` means unlimited buffering and requires an explicit
/// [`ChunkedOutput::flush`] call to emit anything. [`ChunkedOutput::finish`]
/// emits the terminating zero-length chunk and final CRLF.
pub struct ChunkedOutput<W> {
    inner: W,
    buf: BytesMut,
    flush_at: usize,
    finished: bool,
}

impl<W> ChunkedOutput<W> {
    pub fn new(inner: W) -> Self {
        Self::with_flush_buffer(inner, DEFAULT_FLUSH_BUFFER)
    }

    pub fn with_flush_buffer(inner: W, flush_at: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            flush_at,
            finished: false,
        }
    }
}

impl<W: BodyWrite> ChunkedOutput<W> {
    async fn emit_chunk(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let mut framed = BytesMut::with_capacity(self.buf.len() + 16);
        framed.put_slice(format!("{:x}", self.buf.len()).as_bytes());
        framed.put_slice(b"\r\n");
        framed.put_slice(&self.buf);
        framed.put_slice(b"\r\n");
        self.inner.write_all(&framed).await?;
        self.buf.clear();
        Ok(())
    }

    /// Flushes any buffered bytes as a single chunk, then flushes the
    /// underlying sink.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.emit_chunk().await?;
        self.inner.flush().await
    }

    /// Writes the zero-length terminating chunk. Any buffered bytes are
    /// flushed first. Idempotent.
    pub async fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.emit_chunk().await?;
        self.inner.write_all(b"0\r\n\r\n").await?;
        self.inner.flush().await?;
        self.finished = true;
        Ok(())
    }
}

impl<W: BodyWrite> BodyWrite for ChunkedOutput<W> {
    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(malformed("write after chunked stream was finished"));
        }
        self.buf.extend_from_slice(data);
        if self.flush_at != 0 && self.buf.len() >= self.flush_at {
            self.emit_chunk().await?;
        }
        Ok(data.len())
    }

    async fn flush(&mut self) -> io::Result<()> {
        ChunkedOutput::flush(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::WriteHalf;

    #[tokio::test]
    async fn decodes_two_chunks_and_terminator() {
        let wire: &[u8] = b"5\r\nhello\r\n5\r\nworld\r\n0\r\n\r\n";
        let mut input = ChunkedInput::new(wire);
        let mut out = Vec::new();
        input.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"helloworld");
    }

    #[tokio::test]
    async fn rejects_non_hex_size() {
        let wire: &[u8] = b"ZZ\r\nhello\r\n";
        let mut input = ChunkedInput::new(wire);
        let mut buf = [0u8; 16];
        assert!(input.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn encode_then_decode_is_identity() {
        let backing = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::<u8>::new()));
        struct Sink(std::sync::Arc<tokio::sync::Mutex<Vec<u8>>>);
        impl BodyWrite for Sink {
            async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().await.extend_from_slice(buf);
                Ok(buf.len())
            }
            async fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let payload = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let mut output = ChunkedOutput::with_flush_buffer(Sink(backing.clone()), 37);
        output.write_all(&payload).await.unwrap();
        output.finish().await.unwrap();

        let wire = backing.lock().await.clone();
        let mut input = ChunkedInput::new(&wire[..]);
        let mut decoded = Vec::new();
        input.read_to_end(&mut decoded).await.unwrap();
        assert_eq!(decoded, payload);
    }

    #[allow(dead_code)]
    fn assert_write_half_usable<W: tokio::io::AsyncWrite + Unpin + Send>(w: W) {
        fn takes_body_write<T: BodyWrite>(_: T) {}
        takes_body_write(WriteHalf(w));
    }
}
