//! The per-origin connection state machine: dials a transport, negotiates
//! TLS/ALPN or an h2c upgrade, and hands back either an [`Http1Conn`] or a
//! shared [`H2Context`].
//!
//! There's no explicit `Disconnected`/`Connecting`/`H1-Idle`/`H2-Active`
//! state enum: "disconnected" is simply "no [`Connection`] value exists
//! yet", "connecting" is the body of [`dial`], and idle vs. in-flight is
//! owned by whoever holds the [`Lease`] returned from the pool, since at
//! most one task ever touches a given HTTP/1 connection at a time.

use crate::client::Settings;
use crate::common::Origin;
use crate::h1::Http1Conn;
use crate::h2::H2Context;
use crate::tls::AsyncStream;
use bytes::{Buf, BytesMut};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// The type-erased transport every [`Http1Conn`] and [`H2Context`] runs
/// over: a plain TCP stream, or whatever [`crate::tls::TlsConnector`]
/// produced.
pub(crate) type Stream = Pin<Box<dyn AsyncStream>>;

pin_project! {
    /// A stream that yields already-buffered bytes before falling through to
    /// the real transport. Used to hand an h2c-upgraded connection's
    /// unconsumed read buffer to [`H2Context::handshake`]: anything the
    /// HTTP/1 driver already read off the wire past the `101`
    /// response head belongs to the HTTP/2 connection preface response.
    pub(crate) struct PrefixedStream<S> {
        prefix: BytesMut,
        #[pin]
        inner: S,
    }
}

impl<S> PrefixedStream<S> {
    pub(crate) fn new(prefix: BytesMut, inner: S) -> Self {
        Self { prefix, inner }
    }
}

impl<S: AsyncRead> AsyncRead for PrefixedStream<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.project();
        if !this.prefix.is_empty() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix[..n]);
            this.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        this.inner.poll_read(cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for PrefixedStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

/// A freshly dialed connection, not yet registered with a pool.
pub(crate) enum Connection {
    H1(Http1Conn<Stream>),
    H2(Arc<H2Context>),
}

/// Dials `origin` per `settings`, choosing the dial target and HTTP version
/// among the entry paths into HTTP/2: direct ALPN negotiation, a forced
/// prior-knowledge connection, or an h2c upgrade attempted later on the
/// resulting HTTP/1 connection.
///
/// `origin` is the logical request target; when `settings` carries a proxy,
/// the actual TCP/TLS handshake targets the proxy instead (an HTTPS proxy
/// implies TLS to the proxy itself).
pub(crate) async fn dial(origin: &Origin, settings: &Settings) -> crate::Result<Connection> {
    let dial_target = settings.proxy.as_ref().unwrap_or(origin);
    let via_proxy = settings.proxy.is_some();
    tracing::debug!(host = %dial_target.host, port = dial_target.port, via_proxy, "dialing origin");

    let tcp = TcpStream::connect((dial_target.host.as_str(), dial_target.port))
        .await
        .map_err(crate::error::Error::connect)?;
    let _ = tcp.set_nodelay(true);

    let (stream, negotiated_h2): (Stream, bool) = if dial_target.is_tls {
        let alpn = settings.alpn_offer();
        let connected = settings
            .tls_connector
            .connect(&dial_target.host, alpn, tcp)
            .await?;
        tracing::debug!(negotiated_h2 = connected.negotiated_h2, "tls handshake complete");
        (connected.stream, connected.negotiated_h2)
    } else {
        (Box::pin(tcp) as Stream, false)
    };

    if negotiated_h2 || (settings.force_http2 && !settings.disable_http2) {
        tracing::debug!("starting http/2 session over dialed connection");
        let ctx = H2Context::handshake(stream, settings.ping_interval).await?;
        return Ok(Connection::H2(Arc::new(ctx)));
    }

    tracing::trace!("starting http/1 connection over dialed connection");
    let conn = Http1Conn::new(stream, settings.max_keep_alive_timeout);
    Ok(Connection::H1(conn))
}

/// Whether an HTTP/1 connection freshly dialed for `origin` is eligible to
/// offer an h2c upgrade on its first request.
pub(crate) fn h2c_upgrade_eligible(origin: &Origin, settings: &Settings) -> bool {
    !origin.is_tls
        && !settings.force_http2
        && !settings.disable_http2
        && !settings.only_encrypted_http2
}
