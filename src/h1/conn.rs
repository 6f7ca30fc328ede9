//! Per-connection HTTP/1.x driver: owns the socket-ish stream, a small read
//! buffer for partial status lines/headers, and keep-alive bookkeeping.
//! Request/response *callback* orchestration lives one layer up, in
//! [`crate::conn`]; this module only provides the primitives it calls.

use super::role;
use crate::body::{chunked, codec, length::LengthLimited, BodyRead, BodyWrite, ContentDecoded, Framing, WriteHalf};
use crate::error::Error;
use crate::header::HeaderMap;
use crate::model::{HttpVersion, Request};
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HEAD_READ_SCRATCH: usize = 8 * 1024;

fn connection_has_token(headers: &HeaderMap, token: &str) -> bool {
    headers.get_all("connection").any(|v| {
        v.to_str()
            .is_some_and(|s| s.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
    })
}

/// Keep-alive accounting.
pub(crate) struct KeepAliveState {
    enabled: bool,
    requests_done: u32,
    max_requests: Option<u32>,
    idle_timeout: Duration,
}

impl KeepAliveState {
    fn new(configured_idle_timeout: Duration) -> Self {
        Self {
            enabled: true,
            requests_done: 0,
            max_requests: None,
            idle_timeout: configured_idle_timeout,
        }
    }

    /// Updates counters and the effective idle timeout after one
    /// request/response exchange completes.
    fn note_exchange(&mut self, version: HttpVersion, req_headers: &HeaderMap, resp_headers: &HeaderMap) {
        self.requests_done += 1;

        if connection_has_token(req_headers, "close") || connection_has_token(resp_headers, "close") {
            self.enabled = false;
        }
        if version == HttpVersion::Http10 && !connection_has_token(resp_headers, "keep-alive") {
            self.enabled = false;
        }

        if let Some(ka) = resp_headers.get("keep-alive").and_then(|v| v.to_str()) {
            for part in ka.split(',') {
                let part = part.trim();
                if let Some(v) = part.strip_prefix("timeout=") {
                    if let Ok(secs) = v.trim().parse::<u64>() {
                        self.idle_timeout = self.idle_timeout.min(Duration::from_secs(secs));
                    }
                } else if let Some(v) = part.strip_prefix("max=") {
                    if let Ok(n) = v.trim().parse::<u32>() {
                        self.max_requests = Some(n);
                    }
                }
            }
        }
    }

    /// Whether the connection must be dropped rather than returned to the
    /// pool: keep-alive was disabled, or the server's advertised request
    /// budget (`Keep-Alive: max=`) has been exhausted, so the client can
    /// proactively reconnect before the next request instead of racing the
    /// server's own close.
    pub(crate) fn should_close(&self) -> bool {
        if !self.enabled {
            return true;
        }
        matches!(self.max_requests, Some(max) if self.requests_done >= max)
    }

    pub(crate) fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub(crate) fn requests_done(&self) -> u32 {
        self.requests_done
    }
}

/// Borrows a connection's read buffer and socket for exactly the lifetime
/// of one body read chain. Drains any bytes already buffered from head
/// parsing before reading more off the socket, so a head read that
/// over-reads into the body doesn't lose data.
pub(crate) struct ConnBody<'a, S> {
    read_buf: &'a mut BytesMut,
    io: &'a mut S,
}

impl<S: AsyncRead + Unpin + Send> BodyRead for ConnBody<'_, S> {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.read_buf.is_empty() {
            let n = self.read_buf.len().min(buf.len());
            buf[..n].copy_from_slice(&self.read_buf[..n]);
            let _ = self.read_buf.split_to(n);
            return Ok(n);
        }
        AsyncReadExt::read(self.io, buf).await
    }
}

/// The request body writer selected for a given request.
pub(crate) enum RequestBodyWriter<'a, S> {
    /// Explicit `Content-Length`, or HTTP/1.0, or `Connection: close`: no
    /// extra framing, bytes go straight to the socket.
    Passthrough(WriteHalf<&'a mut S>),
    /// HTTP/1.1 with no explicit length and no `Connection: close`.
    Chunked(chunked::ChunkedOutput<WriteHalf<&'a mut S>>),
}

impl<S: AsyncWrite + Unpin + Send> BodyWrite for RequestBodyWriter<'_, S> {
    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Passthrough(w) => w.write(buf).await,
            Self::Chunked(w) => w.write(buf).await,
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Passthrough(w) => w.flush().await,
            Self::Chunked(w) => w.flush().await,
        }
    }
}

impl<S: AsyncWrite + Unpin + Send> RequestBodyWriter<'_, S> {
    /// Finalizes the body: for chunked, writes the terminating zero-chunk;
    /// otherwise just flushes.
    pub(crate) async fn finish(&mut self) -> crate::Result<()> {
        match self {
            Self::Passthrough(w) => w.flush().await.map_err(Error::from),
            Self::Chunked(w) => w.finish().await.map_err(Error::from),
        }
    }
}

/// Response body type returned by [`Http1Conn::select_response_body`]: the
/// framing layer (chunked/length/close-delimited) with content-coding
/// applied over it. The end-callback wrapper is added by the caller, which
/// knows what bookkeeping to run on EOF.
pub(crate) type ResponseBody<'a, S> = ContentDecoded<Framing<ConnBody<'a, S>>>;

pub(crate) struct Http1Conn<S> {
    io: S,
    read_buf: BytesMut,
    keep_alive: KeepAliveState,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Http1Conn<S> {
    pub(crate) fn new(io: S, configured_idle_timeout: Duration) -> Self {
        Self {
            io,
            read_buf: BytesMut::new(),
            keep_alive: KeepAliveState::new(configured_idle_timeout),
        }
    }

    pub(crate) fn should_close(&self) -> bool {
        self.keep_alive.should_close()
    }

    pub(crate) fn idle_timeout(&self) -> Duration {
        self.keep_alive.idle_timeout()
    }

    /// Number of request/response exchanges already completed on this
    /// connection. Zero means this is the first request, which is the only
    /// one eligible to carry h2c upgrade headers.
    pub(crate) fn requests_done(&self) -> u32 {
        self.keep_alive.requests_done()
    }

    pub(crate) fn note_exchange(&mut self, version: HttpVersion, req_headers: &HeaderMap, resp_headers: &HeaderMap) {
        self.keep_alive.note_exchange(version, req_headers, resp_headers);
    }

    /// Tears the connection down into its raw stream and any bytes already
    /// read off the wire but not yet consumed. Used for the h2c upgrade
    /// hand-off: the bytes immediately following the `101` response head are
    /// the start of the HTTP/2 connection preface response, and must be
    /// replayed to the new [`crate::h2::H2Context`] before it reads anything
    /// further off the socket itself.
    pub(crate) fn into_parts(self) -> (S, BytesMut) {
        (self.io, self.read_buf)
    }

    async fn fill_more(&mut self) -> std::io::Result<usize> {
        let mut scratch = [0u8; HEAD_READ_SCRATCH];
        let n = AsyncReadExt::read(&mut self.io, &mut scratch).await?;
        self.read_buf.extend_from_slice(&scratch[..n]);
        Ok(n)
    }

    /// Writes the request line and headers. `request_target` is the
    /// absolute URL when going through a forward proxy, else path+query.
    pub(crate) async fn write_head(&mut self, req: &Request, request_target: &str) -> crate::Result<()> {
        let wire = role::serialize_request_head(req, request_target);
        AsyncWriteExt::write_all(&mut self.io, &wire).await?;
        Ok(())
    }

    pub(crate) fn request_body_writer(&mut self, req: &Request) -> RequestBodyWriter<'_, S> {
        let headers = req.headers();
        let has_explicit_length = headers.contains("content-length");
        let conn_close = connection_has_token(headers, "close");
        let write_half = WriteHalf(&mut self.io);

        if !has_explicit_length && req.version() == HttpVersion::Http11 && !conn_close {
            RequestBodyWriter::Chunked(chunked::ChunkedOutput::new(write_half))
        } else {
            RequestBodyWriter::Passthrough(write_half)
        }
    }

    /// Reads and parses the status line + header block, pulling more bytes
    /// off the socket as needed.
    pub(crate) async fn read_response_head(&mut self) -> crate::Result<role::ResponseHead> {
        loop {
            if let Some(head) = role::parse_response_head(&self.read_buf)? {
                let _ = self.read_buf.split_to(head.consumed);
                return Ok(head);
            }
            let n = self.fill_more().await?;
            if n == 0 {
                return Err(Error::protocol_h1("connection closed before response headers completed"));
            }
        }
    }

    /// Builds the response body reader: framing plus content-coding.
    /// `no_body` covers responses that never carry one regardless of
    /// framing headers (HEAD requests, 1xx/204/304).
    pub(crate) fn select_response_body(
        &mut self,
        head: &role::ResponseHead,
        no_body: bool,
    ) -> crate::Result<ResponseBody<'_, S>> {
        let conn_body = ConnBody {
            read_buf: &mut self.read_buf,
            io: &mut self.io,
        };

        let framing = if no_body {
            Framing::Length(LengthLimited::new(conn_body, 0))
        } else if let Some(te) = head.headers.get("transfer-encoding").and_then(|v| v.to_str()) {
            let is_chunked = te
                .split(',')
                .next_back()
                .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"));
            if is_chunked {
                Framing::Chunked(chunked::ChunkedInput::new(conn_body))
            } else {
                return Err(Error::unsupported_encoding(te.to_string()));
            }
        } else if let Some(len) = head
            .headers
            .get("content-length")
            .and_then(|v| v.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            Framing::Length(LengthLimited::new(conn_body, len))
        } else {
            Framing::CloseDelimited(conn_body)
        };

        let coding_token = head.headers.get("content-encoding").and_then(|v| v.to_str());
        Ok(match coding_token {
            None => ContentDecoded::Identity(framing),
            Some(tok) if tok.eq_ignore_ascii_case("identity") => ContentDecoded::Identity(framing),
            Some(tok) => match codec::ContentCoding::parse(tok) {
                Some(coding) => ContentDecoded::Decoded(codec::Decoder::new(framing, coding)),
                None => return Err(Error::unsupported_encoding(tok.to_string())),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpMethod, HttpVersion, Request};
    use tokio::io::duplex;

    #[tokio::test]
    async fn writes_request_and_reads_length_delimited_response() {
        let (client_io, mut server_io) = duplex(4096);
        let server = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let n = server_io.read(&mut buf).await.unwrap();
            let _ = &buf[..n];
            server_io
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
                .await
                .unwrap();
        });

        let mut conn = Http1Conn::new(client_io, Duration::from_secs(30));
        let req = Request::new(HttpMethod::Get, "/", HttpVersion::Http11);
        conn.write_head(&req, "/").await.unwrap();

        let head = conn.read_response_head().await.unwrap();
        assert_eq!(head.status.as_u16(), 200);

        let mut body = conn.select_response_body(&head, false).unwrap();
        let mut out = Vec::new();
        body.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn chunked_writer_selected_for_http11_without_length() {
        let (client_io, _server_io) = duplex(4096);
        let mut conn = Http1Conn::new(client_io, Duration::from_secs(30));
        let req = Request::new(HttpMethod::Post, "/", HttpVersion::Http11);
        assert!(matches!(conn.request_body_writer(&req), RequestBodyWriter::Chunked(_)));
    }

    #[tokio::test]
    async fn keep_alive_disabled_by_connection_close() {
        let (client_io, _server_io) = duplex(4096);
        let mut conn = Http1Conn::new(client_io, Duration::from_secs(30));
        let mut resp_headers = HeaderMap::new();
        crate::header::insert_static(&mut resp_headers, "Connection", "close");
        conn.note_exchange(HttpVersion::Http11, &HeaderMap::new(), &resp_headers);
        assert!(conn.should_close());
    }

    #[tokio::test]
    async fn keep_alive_max_requests_triggers_close() {
        let (client_io, _server_io) = duplex(4096);
        let mut conn = Http1Conn::new(client_io, Duration::from_secs(30));
        let mut resp_headers = HeaderMap::new();
        crate::header::insert_static(&mut resp_headers, "Keep-Alive", "timeout=5, max=1");
        conn.note_exchange(HttpVersion::Http11, &HeaderMap::new(), &resp_headers);
        assert!(conn.should_close());
    }
}
