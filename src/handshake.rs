//! Client-side handshake: build the HTTP Upgrade request, send it, and verify
//! the response's challenge. Grounded on the request string assembly in the
//! teacher's `request.rs::construct_http_request` and the Sec-WebSocket-Accept
//! math in `utils.rs`. Server-role handshakes are a Non-goal.

use crate::config::ClientOptions;
use crate::error::Error;
use crate::url::WsUrl;
use crate::utils::{generate_websocket_accept_value, generate_websocket_key};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

const HTTP_HEADER_DELIMITER: &str = "\r\n\r\n";
const MAX_RESPONSE_HEADER_BYTES: usize = 16 * 1024;

/// Runs the handshake over an already-connected stream. On success the stream
/// is left positioned right after the header block, ready for frame traffic.
pub async fn perform_client_handshake<T>(stream: &mut T, url: &WsUrl, opts: &ClientOptions) -> Result<(), Error>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_websocket_key();
    let request = build_request(url, &key, opts);

    timeout(opts.send_timeout, stream.write_all(request.as_bytes()))
        .await
        .map_err(|source| Error::Timeout { source })??;

    let response = read_response(stream, opts).await?;
    verify_response(&response, &key)
}

fn build_request(url: &WsUrl, key: &str, opts: &ClientOptions) -> String {
    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Key: {}\r\nSec-WebSocket-Version: 13\r\n",
        url.request_target, url.host_header, key,
    );
    for (name, value) in &opts.headers {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("\r\n");
    request
}

struct HandshakeResponse {
    status: u16,
    headers: Vec<(String, String)>,
}

impl HandshakeResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

async fn read_response<T>(stream: &mut T, opts: &ClientOptions) -> Result<HandshakeResponse, Error>
where
    T: AsyncRead + Unpin,
{
    let mut raw = Vec::with_capacity(512);
    let mut byte = [0u8; 1];

    let read_loop = async {
        loop {
            if raw.len() > MAX_RESPONSE_HEADER_BYTES {
                return Err(Error::IncompleteHTTPResponse);
            }
            let n = stream.read(&mut byte).await?;
            if n == 0 {
                return Err(Error::IncompleteHTTPResponse);
            }
            raw.push(byte[0]);
            if raw.ends_with(HTTP_HEADER_DELIMITER.as_bytes()) {
                return Ok(());
            }
        }
    };
    timeout(opts.recv_timeout, read_loop)
        .await
        .map_err(|source| Error::Timeout { source })??;

    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut response = httparse::Response::new(&mut header_storage);
    match response.parse(&raw)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(Error::IncompleteHTTPResponse),
    }

    let status = response.code.ok_or(Error::IncompleteHTTPResponse)?;
    let headers = response
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    Ok(HandshakeResponse { status, headers })
}

fn verify_response(response: &HandshakeResponse, key: &str) -> Result<(), Error> {
    let expected_accept = generate_websocket_accept_value(key.to_string());

    if response.status != 101 {
        return Err(Error::RequestError {
            code: response.status,
            headers: response.headers.clone(),
        });
    }

    let upgrade_ok = response
        .header("Upgrade")
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let connection_ok = response
        .header("Connection")
        .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")));
    let accept = response.header("Sec-WebSocket-Accept");

    if !upgrade_ok {
        return Err(Error::HandshakeError {
            reason: "missing or invalid Upgrade header".to_string(),
            challenge: expected_accept,
        });
    }
    if !connection_ok {
        return Err(Error::HandshakeError {
            reason: "missing or invalid Connection header".to_string(),
            challenge: expected_accept,
        });
    }
    match accept {
        Some(value) if value == expected_accept => Ok(()),
        Some(value) => Err(Error::HandshakeError {
            reason: format!("Sec-WebSocket-Accept mismatch: got `{}`", value),
            challenge: expected_accept,
        }),
        None => Err(Error::HandshakeError {
            reason: "missing Sec-WebSocket-Accept header".to_string(),
            challenge: expected_accept,
        }),
    }
}
