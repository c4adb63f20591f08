//! WebSocket URL validation, grounded on the scheme/host/port handling in the
//! teacher's `request.rs::construct_http_request`. Resolves open question (a)
//! from the spec's source: reject if host is absent, port can't be derived, or
//! the scheme isn't `ws`/`wss` — full URL syntax is delegated to the `url` crate.

use crate::error::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct WsUrl {
    pub use_tls: bool,
    pub host: String,
    pub port: u16,
    /// `host:port`, ready to hand to a TCP dialer.
    pub authority: String,
    /// `host` or `host:port` as it should appear in the `Host` request header
    /// (no port when the URL didn't name one explicitly).
    pub host_header: String,
    pub request_target: String,
}

pub fn parse(ws_url: &str) -> Result<WsUrl, Error> {
    let parsed = Url::parse(ws_url)?;

    let (use_tls, default_port) = match parsed.scheme() {
        "ws" => (false, 80),
        "wss" => (true, 443),
        _ => return Err(Error::InvalidSchemeURL),
    };

    let host = parsed.host_str().filter(|h| !h.is_empty()).ok_or(Error::URLNoHost)?.to_string();
    let port = parsed.port().unwrap_or(default_port);
    if port == 0 {
        return Err(Error::URLNoPort);
    }

    let host_header = match parsed.port() {
        Some(explicit) => format!("{}:{}", host, explicit),
        None => host.clone(),
    };

    let request_target = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    Ok(WsUrl {
        use_tls,
        authority: format!("{}:{}", host, port),
        host,
        port,
        host_header,
        request_target,
    })
}
