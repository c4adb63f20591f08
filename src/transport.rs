//! TCP/TLS dialing behind a small enum, the supplement spec.md's §1 calls out
//! as "interfaces only" at the core but which a usable client still needs.
//! Grounded on the plain/secure split the teacher's `server.rs`/`read.rs` already
//! reference as `SocketFlowStream`, here rebuilt for the client dial path instead
//! of the accept path.

use crate::config::ClientOptions;
use crate::error::Error;
use crate::url::WsUrl;
use pki_types::ServerName;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{client::TlsStream, TlsConnector};

/// The socket a `Conn` talks through: either a bare TCP stream (`ws://`) or a
/// TLS stream wrapping one (`wss://`). Both halves implement `AsyncRead`/
/// `AsyncWrite`, so the rest of the crate never needs to know which one it has.
pub enum SocketFlowStream {
    Plain(TcpStream),
    Secure(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for SocketFlowStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketFlowStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            SocketFlowStream::Secure(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketFlowStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SocketFlowStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            SocketFlowStream::Secure(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketFlowStream::Plain(s) => Pin::new(s).poll_flush(cx),
            SocketFlowStream::Secure(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketFlowStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            SocketFlowStream::Secure(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Dials `url.authority`, honoring `opts.connect_timeout`, then layers TLS on
/// top when the URL scheme demanded it. IO errors here are the connect-time
/// `Error::ConnError` that spec §7 says a handler can recover from via
/// `handle_connect_failure`.
pub async fn connect(url: &WsUrl, opts: &ClientOptions) -> Result<SocketFlowStream, Error> {
    let tcp = timeout(opts.connect_timeout, TcpStream::connect(&url.authority))
        .await
        .map_err(|_| {
            Error::ConnError {
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            }
        })?
        .map_err(|source| Error::ConnError { source })?;
    tcp.set_nodelay(true).ok();

    if !url.use_tls {
        return Ok(SocketFlowStream::Plain(tcp));
    }

    let tls_config = match &opts.tls_config {
        Some(config) => config.clone(),
        None => Arc::new(default_tls_config()),
    };
    let connector = TlsConnector::from(tls_config);
    let server_name = ServerName::try_from(url.host.clone())?;

    let tls = timeout(opts.connect_timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| {
            Error::ConnError {
                source: io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"),
            }
        })?
        .map_err(|source| Error::ConnError { source })?;

    Ok(SocketFlowStream::Secure(Box::new(tls)))
}

fn default_tls_config() -> rustls::ClientConfig {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}
