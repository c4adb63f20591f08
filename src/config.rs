use rustls::ClientConfig as RustlsClientConfig;
use std::sync::Arc;
use std::time::Duration;

/// The close-grace timer's literal default: the teacher repo never made this
/// configurable, so it's preserved at exactly 5s and additionally surfaced as
/// `ClientOptions::close_timeout` for an embedder that needs a different value.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_frame_size: usize,
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_message_size: 64 << 20,
            max_frame_size: 16 << 20,
        }
    }
}

/// Options accepted by `start`/`start_link`, carrying the Conn opaquely (headers,
/// timeouts, TLS trust store) plus the `async` flag from the library surface.
#[derive(Clone)]
pub struct ClientOptions {
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub recv_timeout: Duration,
    pub send_timeout: Duration,
    pub close_timeout: Duration,
    pub websocket: WebSocketConfig,
    pub tls_config: Option<Arc<RustlsClientConfig>>,
    /// When `true`, `start` returns immediately with the session id; connect
    /// failures are delivered only through `Handler::handle_connect_failure`.
    pub async_connect: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            headers: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            recv_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            websocket: WebSocketConfig::default(),
            tls_config: None,
            async_connect: false,
        }
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("headers", &self.headers)
            .field("connect_timeout", &self.connect_timeout)
            .field("recv_timeout", &self.recv_timeout)
            .field("send_timeout", &self.send_timeout)
            .field("close_timeout", &self.close_timeout)
            .field("websocket", &self.websocket)
            .field("tls_config", &self.tls_config.is_some())
            .field("async_connect", &self.async_connect)
            .finish()
    }
}
