//! The TLS collaborator interface, kept separate from any one concrete TLS
//! library, plus a default [`rustls`]-backed implementation.
//!
//! The core only needs two things from TLS: a handshake that yields a
//! readable/writable stream, and the negotiated ALPN protocol so the caller
//! can decide whether to open an HTTP/2 session immediately.

use crate::error::Error;
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A boxed, type-erased duplex stream: whatever TLS handed back, or a plain
/// `TcpStream` when no TLS was involved.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// The ALPN offer this core sends, per whether HTTP/2 is allowed at all.
pub const ALPN_WITH_H2: &[&str] = &["h2", "http/1.1"];
pub const ALPN_HTTP1_ONLY: &[&str] = &["http/1.1"];

/// The result of a successful TLS handshake.
pub struct Connected {
    pub stream: Pin<Box<dyn AsyncStream>>,
    /// `true` when ALPN selected an `h2`-prefixed protocol.
    pub negotiated_h2: bool,
}

/// External collaborator: performs the TLS client handshake over an already
/// connected transport. The concrete TLS library is out of scope for this
/// crate; this trait is the seam it plugs into.
///
/// Implemented as a boxed-future method rather than `async fn` so the core
/// can hold a `dyn TlsConnector` in [`crate::client::Settings`] without
/// committing to one TLS backend at compile time.
pub trait TlsConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        server_name: &'a str,
        alpn_protocols: &'a [&'a str],
        stream: TcpStream,
    ) -> Pin<Box<dyn Future<Output = Result<Connected, Error>> + Send + 'a>>;
}

#[cfg(feature = "rustls")]
pub use rustls_backend::RustlsConnector;

#[cfg(feature = "rustls")]
mod rustls_backend {
    use super::{AsyncStream, Connected, Error, TlsConnector};
    use rustls_pki_types::ServerName;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use tokio::net::TcpStream;
    use tokio_rustls::rustls::{self, ClientConfig};

    /// The default [`TlsConnector`]: native + Mozilla trust roots, ALPN
    /// offered per-connection by the caller.
    pub struct RustlsConnector {
        base_config: Arc<ClientConfig>,
    }

    impl RustlsConnector {
        /// Builds a connector trusting the platform's native root store
        /// plus the bundled Mozilla roots, falling back to the bundled set
        /// alone if native roots cannot be loaded.
        pub fn new() -> Result<Self, Error> {
            let mut roots = rustls::RootCertStore::empty();
            for cert in rustls_native_certs::load_native_certs().certs {
                let _ = roots.add(cert);
            }
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();

            Ok(Self {
                base_config: Arc::new(config),
            })
        }
    }

    impl TlsConnector for RustlsConnector {
        fn connect<'a>(
            &'a self,
            server_name: &'a str,
            alpn_protocols: &'a [&'a str],
            stream: TcpStream,
        ) -> Pin<Box<dyn Future<Output = Result<Connected, Error>> + Send + 'a>> {
            Box::pin(async move {
                let mut config = (*self.base_config).clone();
                config.alpn_protocols = alpn_protocols.iter().map(|p| p.as_bytes().to_vec()).collect();

                let name = ServerName::try_from(server_name.to_string())
                    .map_err(|e| Error::bad_url(format!("invalid TLS server name: {e}")))?;

                let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
                let tls_stream = connector
                    .connect(name, stream)
                    .await
                    .map_err(Error::connect)?;

                let alpn_protocol = tls_stream.get_ref().1.alpn_protocol().map(|p| p.to_vec());
                let negotiated_h2 = alpn_protocol.as_deref().is_some_and(|p| p.starts_with(b"h2"));
                tracing::debug!(
                    alpn = ?alpn_protocol.as_deref().map(String::from_utf8_lossy),
                    negotiated_h2,
                    "tls alpn negotiation result"
                );

                Ok(Connected {
                    stream: Box::pin(tls_stream) as Pin<Box<dyn AsyncStream>>,
                    negotiated_h2,
                })
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpn_offers_differ_by_h2_support() {
        assert_eq!(ALPN_WITH_H2, &["h2", "http/1.1"]);
        assert_eq!(ALPN_HTTP1_ONLY, &["http/1.1"]);
    }
}
