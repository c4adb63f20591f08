//! `Conn`: a thin facade over a `Transport`, owned exclusively by one `Session`.
//! Grounded on the teacher's own `WSConnection`/`Writer` split (`connection.rs`,
//! `write.rs`) — here collapsed into one type since a client `Session` always
//! owns both halves of the same socket, unlike the teacher's server which hands
//! the writer half to the end-user separately.

use crate::codec;
use crate::config::ClientOptions;
use crate::error::Error;
use crate::frame::Frame;
use crate::handshake::perform_client_handshake;
use crate::transport::{self, SocketFlowStream};
use crate::url::{self, WsUrl};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

/// Holds the target, the negotiated options, and (once open) the live socket.
/// `socket` is `None` before connecting and after teardown — matching the
/// "nullable after teardown" invariant in spec §3.
pub struct Conn {
    pub url: WsUrl,
    pub options: ClientOptions,
    socket: Option<SocketFlowStream>,
}

impl Conn {
    pub fn new(raw_url: &str, options: ClientOptions) -> Result<Self, Error> {
        let url = url::parse(raw_url)?;
        Ok(Self {
            url,
            options,
            socket: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Dials the transport and runs the handshake. On success the socket is
    /// stored and ready for frame traffic.
    pub async fn open(&mut self) -> Result<(), Error> {
        let mut socket = transport::connect(&self.url, &self.options).await?;
        perform_client_handshake(&mut socket, &self.url, &self.options).await?;
        self.socket = Some(socket);
        Ok(())
    }

    /// Reads whatever bytes are available right now into `buf`. Returns the
    /// number of bytes read; `0` means the peer closed the TCP connection.
    pub async fn recv(&mut self, buf: &mut BytesMut) -> Result<usize, Error> {
        let socket = self.socket.as_mut().ok_or(Error::CommunicationError)?;
        let mut chunk = [0u8; 8192];
        let n = timeout(self.options.recv_timeout, socket.read(&mut chunk))
            .await
            .map_err(|source| Error::Timeout { source })??;
        if n > 0 {
            buf.extend_from_slice(&chunk[..n]);
        }
        Ok(n)
    }

    /// Encodes and writes one frame. A write after the socket is already gone
    /// is reported as `CommunicationError`, which the session layer maps onto
    /// `CloseReason::RemoteClosed` per spec §7.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        let bytes = codec::encode(frame)?;
        self.send_bytes(&bytes).await
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let socket = self.socket.as_mut().ok_or(Error::CommunicationError)?;
        timeout(self.options.send_timeout, socket.write_all(bytes))
            .await
            .map_err(|source| Error::Timeout { source })?
            .map_err(|_| Error::CommunicationError)
    }

    /// Tears the socket down. Idempotent: closing an already-closed `Conn` is
    /// a no-op, matching the "best-effort" close described in spec §4.5.
    pub async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.shutdown().await;
        }
    }
}
