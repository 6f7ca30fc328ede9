//! Body reader/writer composition.
//!
//! Response bodies are built bottom-up from the connection stream: a framing
//! layer ([`chunked`] or [`length`]) determines *how much* to read, an
//! optional [`codec`] content-coding layer determines *what it means*, and an
//! end-callback wrapper finalizes bookkeeping on EOF. Request bodies are
//! built the same way in reverse for writing.
//!
//! Every layer implements [`BodyRead`] or [`BodyWrite`], small async traits
//! kept separate from [`tokio::io::AsyncRead`]/[`AsyncWrite`] so that the
//! composition above reads as plain `async fn` calls instead of hand-rolled
//! `Future`/`Poll` state machines. A blanket impl bridges any real
//! `AsyncRead`/`AsyncWrite` (a `TcpStream`, a TLS stream, ...) into these
//! traits for free.

pub mod chunked;
pub mod codec;
pub(crate) mod length;

pub(crate) use length::DecodedLength;

use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// An async byte source. See the module docs for why this exists alongside
/// [`tokio::io::AsyncRead`].
pub trait BodyRead: Send {
    /// Reads into `buf`, returning the number of bytes read, or `0` at EOF.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = std::io::Result<usize>> + Send;

    /// Reads until EOF, appending to `out`. Default implementation loops
    /// over [`BodyRead::read`] with a fixed-size scratch buffer.
    fn read_to_end(
        &mut self,
        out: &mut Vec<u8>,
    ) -> impl Future<Output = std::io::Result<usize>> + Send
    where
        Self: Sized,
    {
        async move {
            let mut total = 0;
            let mut scratch = [0u8; 8 * 1024];
            loop {
                let n = self.read(&mut scratch).await?;
                if n == 0 {
                    return Ok(total);
                }
                out.extend_from_slice(&scratch[..n]);
                total += n;
            }
        }
    }
}

/// An async byte sink. See the module docs.
pub trait BodyWrite: Send {
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = std::io::Result<usize>> + Send;
    fn flush(&mut self) -> impl Future<Output = std::io::Result<()>> + Send;

    /// Writes the full buffer, looping over [`BodyWrite::write`].
    fn write_all(&mut self, mut buf: &[u8]) -> impl Future<Output = std::io::Result<()>> + Send
    where
        Self: Sized,
    {
        async move {
            while !buf.is_empty() {
                let n = self.write(buf).await?;
                if n == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ));
                }
                buf = &buf[n..];
            }
            Ok(())
        }
    }
}

impl<T: AsyncRead + Unpin + Send> BodyRead for T {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        AsyncReadExt::read(self, buf).await
    }
}

/// Newtype so a raw `AsyncWrite` stream can be used as a [`BodyWrite`]
/// without conflicting with the `BodyRead` blanket impl above (both would
/// otherwise apply to the same connection stream type).
pub struct WriteHalf<W>(pub W);

impl<W: AsyncWrite + Unpin + Send> BodyWrite for WriteHalf<W> {
    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        AsyncWriteExt::write(&mut self.0, buf).await
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        AsyncWriteExt::flush(&mut self.0).await
    }
}

/// Runs `finalize` exactly once, the first time `read` returns `Ok(0)`.
///
/// Lets the connection driver learn that a body was fully drained without
/// the caller needing to inspect the framing layer directly.
pub struct EndCallback<R, F> {
    inner: R,
    on_end: Option<F>,
    ended: bool,
}

impl<R, F> EndCallback<R, F>
where
    F: FnOnce() + Send,
{
    pub fn new(inner: R, on_end: F) -> Self {
        Self {
            inner,
            on_end: Some(on_end),
            ended: false,
        }
    }
}

impl<R, F> BodyRead for EndCallback<R, F>
where
    R: BodyRead,
    F: FnOnce() + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf).await?;
        if n == 0 && !self.ended {
            self.ended = true;
            if let Some(f) = self.on_end.take() {
                f();
            }
        }
        Ok(n)
    }
}

/// Collects bytes written by a requester callback before the request head
/// goes on the wire. Headers must be finalized first (so a callback's
/// `headers_mut()` edits land in the serialized head), which means the head
/// can't be written until the callback returns — so the body it wrote along
/// the way is buffered here and flushed through the real framing layer
/// (chunked or passthrough) afterward.
pub(crate) struct BufferedBody(Vec<u8>);

impl BufferedBody {
    pub(crate) fn new() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl BodyWrite for BufferedBody {
    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A boxed future, for the object-safe body traits below.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe counterpart to [`BodyRead`].
///
/// `BodyRead::read` returns `impl Future`, which is not dyn-compatible; this
/// trait boxes the future per call instead so a response body can be handed
/// to a caller's responder callback as `&mut dyn DynBodyRead` without the
/// callback needing to know the concrete framing/coding stack underneath.
pub trait DynBodyRead: Send {
    fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> BoxFuture<'a, std::io::Result<usize>>;
}

impl<T: BodyRead> DynBodyRead for T {
    fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> BoxFuture<'a, std::io::Result<usize>> {
        Box::pin(BodyRead::read(self, buf))
    }
}

/// Object-safe counterpart to [`BodyWrite`]. See [`DynBodyRead`].
pub trait DynBodyWrite: Send {
    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, std::io::Result<usize>>;
    fn flush(&mut self) -> BoxFuture<'_, std::io::Result<()>>;
}

impl<T: BodyWrite> DynBodyWrite for T {
    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, std::io::Result<usize>> {
        Box::pin(BodyWrite::write(self, buf))
    }

    fn flush(&mut self) -> BoxFuture<'_, std::io::Result<()>> {
        Box::pin(BodyWrite::flush(self))
    }
}

/// The framing layer selected for a response body: whichever of chunked,
/// length-delimited or connection-close-delimited applies. One enum rather
/// than three distinct generic instantiations so the
/// caller doesn't have to name a different concrete type per response.
pub enum Framing<R> {
    Chunked(chunked::ChunkedInput<R>),
    Length(length::LengthLimited<R>),
    CloseDelimited(R),
}

impl<R: BodyRead> BodyRead for Framing<R> {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Chunked(r) => r.read(buf).await,
            Self::Length(r) => r.read(buf).await,
            Self::CloseDelimited(r) => r.read(buf).await,
        }
    }
}

/// A body that is always already at EOF: the reader handed to a responder
/// callback for a response that never carries one (a `101` upgrade response,
/// or anywhere else framing is moot because the connection was already
/// handed off elsewhere).
pub struct EmptyBody;

impl BodyRead for EmptyBody {
    async fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(0)
    }
}

/// The content-coding layer over a [`Framing`] body: either passed through
/// unmodified, or gzip/deflate-decoded.
pub enum ContentDecoded<R> {
    Identity(R),
    Decoded(codec::Decoder<R>),
}

impl<R: BodyRead> BodyRead for ContentDecoded<R> {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Identity(r) => r.read(buf).await,
            Self::Decoded(r) => r.read(buf).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn end_callback_fires_once_on_eof() {
        let data: &[u8] = b"abc";
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count2 = count.clone();
        let mut r = EndCallback::new(data, move || {
            count2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
        // a second read past EOF must not double-fire the callback
        let mut buf = [0u8; 4];
        let n = r.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
