//! The HTTP/2 context and per-request stream driver.
//!
//! Frame-level concerns (HPACK, settings frames, flow control windows) are
//! the `h2` crate's job; this module drives it: runs its connection future
//! as a background task, measures RTT with a periodic PING, and adapts our
//! [`Request`]/[`Response`] model onto `http::Request`/`http::Response` at
//! the one seam where that's required.

use crate::body::{BodyRead, BodyWrite};
use crate::error::Error;
use crate::header::{HeaderMap, HeaderName, HeaderValue};
use crate::model::{HttpVersion, Response, StatusCode};
use crate::Request;
use bytes::Bytes;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

/// The `HTTP2-Settings` header value for an h2c upgrade request: the
/// Base64-URL-no-padding encoding of a SETTINGS frame payload, here just the
/// 6-byte `ENABLE_PUSH=0` parameter, matching the `enable_push(false)` this
/// core always negotiates post-upgrade.
pub(crate) fn upgrade_settings_header_value() -> String {
    use base64::Engine;
    const ENABLE_PUSH_DISABLED: [u8; 6] = [0x00, 0x02, 0x00, 0x00, 0x00, 0x00];
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(ENABLE_PUSH_DISABLED)
}

/// A live HTTP/2 session: the request-issuing handle, plus shared RTT
/// state the ping timer updates and callers can read.
pub(crate) struct H2Context {
    send_request: h2::client::SendRequest<Bytes>,
    last_rtt: Arc<StdMutex<Option<Duration>>>,
}

impl H2Context {
    /// Performs the HTTP/2 client preface/handshake over `io`, spawns the
    /// connection's event loop as a background task, and (if `ping_interval`
    /// is non-zero) a periodic PING task that records RTT.
    pub(crate) async fn handshake<S>(io: S, ping_interval: Duration) -> crate::Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (send_request, mut connection) = h2::client::Builder::new()
            .enable_push(false)
            .handshake(io)
            .await
            .map_err(Error::protocol_h2)?;

        let ping_pong = connection.ping_pong();

        tokio::spawn(async move {
            match connection.await {
                Ok(()) => tracing::trace!("http/2 connection task exited cleanly"),
                Err(err) => tracing::debug!(error = %err, "http/2 connection terminated"),
            }
        });

        let last_rtt = Arc::new(StdMutex::new(None));

        if let Some(ping_pong) = ping_pong {
            if !ping_interval.is_zero() {
                let last_rtt = last_rtt.clone();
                tokio::spawn(run_ping_timer(ping_pong, ping_interval, last_rtt));
            }
        }

        Ok(Self {
            send_request,
            last_rtt,
        })
    }

    /// Most recently measured round-trip time, if a ping has completed yet.
    pub(crate) fn last_rtt(&self) -> Option<Duration> {
        *self.last_rtt.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a new stream for `req`. Returns the request body writer and a
    /// future that resolves to the response once headers arrive.
    ///
    /// Takes `&self`, not `&mut self`: `h2::client::SendRequest` is itself a
    /// cheap, cloneable handle designed for concurrent use, which is what
    /// lets many logical streams share one physical HTTP/2 connection.
    pub(crate) async fn start_request(
        &self,
        req: &Request,
        authority: &str,
        scheme: &str,
    ) -> crate::Result<(H2RequestBody, H2ResponseFuture)> {
        let mut send_request = self.send_request.clone();
        send_request.ready().await.map_err(Error::protocol_h2)?;

        let uri: http::Uri = format!("{scheme}://{authority}{}", req.target())
            .parse()
            .map_err(|e| Error::bad_url(format!("invalid request target for h2: {e}")))?;

        let mut builder = http::Request::builder()
            .method(req.method().as_str())
            .uri(uri)
            .version(http::Version::HTTP_2);
        for (name, value) in req.headers().iter() {
            builder = builder.header(name.as_str(), value.as_bytes());
        }
        let http_req = builder
            .body(())
            .map_err(|e| Error::protocol_h2(format!("invalid request headers: {e}")))?;

        let has_body = req.method().has_default_body();
        let (response_fut, send_stream) = send_request
            .send_request(http_req, !has_body)
            .map_err(Error::protocol_h2)?;
        tracing::trace!(method = %req.method(), target = req.target(), "http/2 stream opened");

        Ok((
            H2RequestBody { stream: send_stream },
            H2ResponseFuture { inner: response_fut },
        ))
    }
}

async fn run_ping_timer(
    mut ping_pong: h2::PingPong,
    interval: Duration,
    last_rtt: Arc<StdMutex<Option<Duration>>>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let started = Instant::now();
        if ping_pong.ping(h2::Ping::opaque()).await.is_err() {
            tracing::debug!("http/2 ping failed, stopping ping timer");
            return;
        }
        let elapsed = started.elapsed();
        tracing::trace!(rtt = ?elapsed, "http/2 ping round-trip measured");
        *last_rtt.lock().unwrap_or_else(|e| e.into_inner()) = Some(elapsed);
    }
}

/// Wraps the per-request [`h2::client::ResponseFuture`] so awaiting it
/// yields our [`Response`]/[`H2ResponseBody`] pair rather than `h2`'s own
/// types.
pub(crate) struct H2ResponseFuture {
    inner: h2::client::ResponseFuture,
}

impl H2ResponseFuture {
    pub(crate) async fn await_response(self) -> crate::Result<(Response, H2ResponseBody)> {
        let http_response = self.inner.await.map_err(Error::protocol_h2)?;
        let (parts, recv_stream) = http_response.into_parts();

        let status = StatusCode::new(parts.status.as_u16())
            .map_err(|_| Error::protocol_h2("invalid :status pseudo-header"))?;
        let mut headers = HeaderMap::new();
        for (name, value) in parts.headers.iter() {
            let Ok(name) = HeaderName::parse(name.as_str()) else {
                continue;
            };
            let Ok(value) = HeaderValue::parse(Bytes::copy_from_slice(value.as_bytes())) else {
                continue;
            };
            headers.insert(name, value);
        }

        let response = Response::new(HttpVersion::Http2, status, String::new(), headers);
        Ok((
            response,
            H2ResponseBody {
                stream: recv_stream,
                leftover: Bytes::new(),
            },
        ))
    }
}

/// A request body writer over an HTTP/2 stream's DATA channel. Never
/// chunked: HTTP/2 framing carries its own length, so writes go straight to
/// the stream's data channel.
pub(crate) struct H2RequestBody {
    stream: h2::SendStream<Bytes>,
}

impl BodyWrite for H2RequestBody {
    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream
            .send_data(Bytes::copy_from_slice(buf), false)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(buf.len())
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl H2RequestBody {
    /// Ends the stream with a zero-length, end-of-stream DATA frame.
    pub(crate) fn finish(mut self) -> std::io::Result<()> {
        self.stream
            .send_data(Bytes::new(), true)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// A response body reader over an HTTP/2 stream's DATA channel, releasing
/// flow-control credit as bytes arrive and buffering whatever a DATA frame
/// doesn't fit in the caller's `buf` for the next `read` call.
pub(crate) struct H2ResponseBody {
    stream: h2::RecvStream,
    leftover: Bytes,
}

impl BodyRead for H2ResponseBody {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.leftover.is_empty() {
            let Some(chunk) = self.stream.data().await else {
                return Ok(0);
            };
            let chunk = chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            let _ = self.stream.flow_control().release_capacity(chunk.len());
            self.leftover = chunk;
        }

        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        let _ = self.leftover.split_to(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpMethod, Request};

    #[test]
    fn upgrade_settings_header_has_no_padding() {
        let value = upgrade_settings_header_value();
        assert!(!value.contains('='));
        assert!(!value.is_empty());
    }

    #[tokio::test]
    async fn response_body_read_reassembles_a_data_frame_larger_than_the_caller_buffer() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);

        tokio::spawn(async move {
            let mut server = h2::server::handshake(server_io).await.unwrap();
            if let Some(result) = server.accept().await {
                let (_request, mut respond) = result.unwrap();
                let response = http::Response::new(());
                let mut send = respond.send_response(response, false).unwrap();
                send.send_data(Bytes::from(vec![b'x'; 5000]), true).unwrap();
            }
            while server.accept().await.is_some() {}
        });

        let ctx = H2Context::handshake(client_io, Duration::ZERO).await.unwrap();
        let req = Request::new(HttpMethod::Get, "/", HttpVersion::Http2);
        let (writer, response_fut) = ctx.start_request(&req, "example.org", "http").await.unwrap();
        writer.finish().unwrap();

        let (_response, mut body) = response_fut.await_response().await.unwrap();
        let mut out = Vec::new();
        let mut scratch = [0u8; 1024];
        loop {
            let n = BodyRead::read(&mut body, &mut scratch).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&scratch[..n]);
        }

        assert_eq!(out.len(), 5000);
        assert!(out.iter().all(|&b| b == b'x'));
    }

    #[tokio::test(start_paused = true)]
    async fn ping_timer_records_rtt_over_loopback_session() {
        let (client_io, server_io) = tokio::io::duplex(4096);

        tokio::spawn(async move {
            let mut server = h2::server::handshake(server_io).await.unwrap();
            while server.accept().await.is_some() {}
        });

        let ctx = H2Context::handshake(client_io, Duration::from_millis(50)).await.unwrap();
        assert!(ctx.last_rtt().is_none());

        tokio::time::advance(Duration::from_millis(200)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(ctx.last_rtt().is_some());
    }
}
