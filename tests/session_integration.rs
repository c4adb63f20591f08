//! Integration tests spinning up a local `TcpListener` as a minimal scripted
//! server, matching the literal scenarios in spec §8. The teacher's own
//! `examples/echo_server.rs` does this kind of thing for manual testing; here
//! it's scripted so each scenario is a single `#[tokio::test]`.

use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use socket_flow_client::config::ClientOptions;
use socket_flow_client::error::Error;
use socket_flow_client::handler::{ConnectFailure, ConnectFailureReply, DisconnectReply, Handler, HandlerReply};
use socket_flow_client::message::{CloseReason, WsMessage};
use socket_flow_client::{client, Frame, OpCode};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    (listener, format!("ws://{}/", addr))
}

fn accept_value(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Reads the client's HTTP Upgrade request off `stream` and returns the
/// `Sec-WebSocket-Key` it sent.
async fn read_handshake_request(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.expect("read request byte");
        assert_ne!(n, 0, "client closed before sending a full request");
        raw.push(byte[0]);
        if raw.ends_with(b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&raw);
    text.lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
        .map(|v| v.trim().to_string())
        .expect("request carried a Sec-WebSocket-Key header")
}

async fn accept_handshake(stream: &mut TcpStream) {
    let key = read_handshake_request(stream).await;
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept_value(&key)
    );
    stream.write_all(response.as_bytes()).await.expect("write handshake response");
}

async fn reject_handshake(stream: &mut TcpStream, status: &str) {
    let _ = read_handshake_request(stream).await;
    let response = format!("HTTP/1.1 {} \r\nContent-Length: 0\r\n\r\n", status);
    stream.write_all(response.as_bytes()).await.expect("write rejection");
}

/// Writes one unmasked server->client frame, the shape a real server sends.
async fn write_server_frame(stream: &mut TcpStream, final_fragment: bool, opcode: OpCode, payload: &[u8]) {
    let mut out = Vec::with_capacity(payload.len() + 10);
    out.push(((final_fragment as u8) << 7) | opcode.as_u8());
    let len = payload.len();
    if len <= 125 {
        out.push(len as u8);
    } else if len <= 65535 {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);
    stream.write_all(&out).await.expect("write server frame");
}

/// Reads one masked client->server frame and returns its unmasked payload.
async fn read_client_frame(stream: &mut TcpStream) -> Frame {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.expect("read frame header");
    let final_fragment = header[0] & 0b1000_0000 != 0;
    let opcode = OpCode::from(header[0] & 0b0000_1111).expect("valid opcode");
    let masked = header[1] & 0b1000_0000 != 0;
    assert!(masked, "client frames must be masked");
    let mut len = (header[1] & 0b0111_1111) as usize;
    if len == 126 {
        let mut ext = [0u8; 2];
        stream.read_exact(&mut ext).await.expect("read ext len");
        len = u16::from_be_bytes(ext) as usize;
    } else if len == 127 {
        let mut ext = [0u8; 8];
        stream.read_exact(&mut ext).await.expect("read ext len");
        len = u64::from_be_bytes(ext) as usize;
    }
    let mut mask = [0u8; 4];
    stream.read_exact(&mut mask).await.expect("read mask");
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.expect("read payload");
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= mask[i % 4];
    }
    Frame::new(final_fragment, opcode, payload)
}

struct RecordingHandler {
    received: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Handler for RecordingHandler {
    type State = ();

    async fn handle_frame(&mut self, frame: WsMessage, state: ()) -> Result<HandlerReply<()>, Error> {
        if let WsMessage::Text(text) = frame {
            self.received.lock().unwrap().push(text);
        }
        Ok(HandlerReply::Ok(state))
    }
}

#[tokio::test]
async fn echo_text_then_orderly_close() {
    let (listener, url) = bind().await;
    let received = Arc::new(Mutex::new(Vec::new()));

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        accept_handshake(&mut stream).await;
        let frame = read_client_frame(&mut stream).await;
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload, b"hello");
        write_server_frame(&mut stream, true, OpCode::Close, &1000u16.to_be_bytes()).await;
        let _ = stream.read(&mut [0u8; 1]).await;
    });

    let handler = RecordingHandler { received: received.clone() };
    let handle = client::start(&url, handler, (), ClientOptions::default())
        .await
        .expect("handshake should succeed");
    handle.send_frame(WsMessage::Text("hello".to_string())).expect("send");

    timeout(Duration::from_secs(2), server).await.expect("server task timed out").unwrap();
}

struct PingPongHandler;

#[async_trait]
impl Handler for PingPongHandler {
    type State = ();
}

#[tokio::test]
async fn ping_yields_default_pong() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        accept_handshake(&mut stream).await;
        write_server_frame(&mut stream, true, OpCode::Ping, b"Llama and Lambs").await;
        let pong = read_client_frame(&mut stream).await;
        assert_eq!(pong.opcode, OpCode::Pong);
        assert_eq!(pong.payload, b"Llama and Lambs");
        write_server_frame(&mut stream, true, OpCode::Close, &1000u16.to_be_bytes()).await;
    });

    let _handle = client::start(&url, PingPongHandler, (), ClientOptions::default())
        .await
        .expect("handshake should succeed");

    timeout(Duration::from_secs(2), server).await.expect("server task timed out").unwrap();
}

struct ReconnectOnDisconnect {
    disconnected: Arc<Mutex<bool>>,
}

#[async_trait]
impl Handler for ReconnectOnDisconnect {
    type State = u32;

    async fn handle_disconnect(&mut self, reason: CloseReason, state: u32) -> Result<DisconnectReply<u32>, Error> {
        assert_eq!(reason, CloseReason::RemoteClosed);
        *self.disconnected.lock().unwrap() = true;
        Ok(DisconnectReply::Reconnect(state))
    }
}

#[tokio::test]
async fn abrupt_tcp_close_triggers_reconnect_with_attempt_one() {
    let (listener, url) = bind().await;
    let disconnected = Arc::new(Mutex::new(false));
    let disconnected_for_server = disconnected.clone();

    let server = tokio::spawn(async move {
        // First connection: drop the TCP stream with no close frame.
        let (mut stream, _) = listener.accept().await.expect("accept #1");
        accept_handshake(&mut stream).await;
        drop(stream);

        // Second connection: the reconnect attempt.
        let (mut stream, _) = listener.accept().await.expect("accept #2");
        accept_handshake(&mut stream).await;
        write_server_frame(&mut stream, true, OpCode::Close, &1000u16.to_be_bytes()).await;

        while !*disconnected_for_server.lock().unwrap() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let handler = ReconnectOnDisconnect { disconnected: disconnected.clone() };
    let options = ClientOptions { async_connect: true, ..ClientOptions::default() };
    let (handle, _join) = client::start_link(&url, handler, 0, options).await.expect("spawn never fails async");

    timeout(Duration::from_secs(2), server).await.expect("server task timed out").unwrap();
    assert_eq!(handle.attempt_number(), 1);
}

struct ReconnectOnUpgradeFailure;

#[async_trait]
impl Handler for ReconnectOnUpgradeFailure {
    type State = ();

    async fn handle_connect_failure(
        &mut self,
        failure: ConnectFailure<'_>,
        state: (),
    ) -> Result<ConnectFailureReply<()>, Error> {
        assert!(matches!(failure.error, Error::RequestError { code: 404, .. }));
        Ok(ConnectFailureReply::Reconnect(state))
    }
}

#[tokio::test]
async fn server_404_with_async_retries_via_connect_failure() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept #1");
        reject_handshake(&mut stream, "404 Not Found").await;
        drop(stream);

        let (mut stream, _) = listener.accept().await.expect("accept #2");
        accept_handshake(&mut stream).await;
        write_server_frame(&mut stream, true, OpCode::Close, &1000u16.to_be_bytes()).await;
    });

    let options = ClientOptions { async_connect: true, ..ClientOptions::default() };
    let (handle, _join) = client::start_link(&url, ReconnectOnUpgradeFailure, (), options)
        .await
        .expect("spawn never fails async");

    timeout(Duration::from_secs(2), server).await.expect("server task timed out").unwrap();
    let _ = handle;
}

struct NoFrameHandler;

#[async_trait]
impl Handler for NoFrameHandler {
    type State = ();
}

#[tokio::test]
async fn illegal_handler_behavior_surfaces_as_bad_response() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        accept_handshake(&mut stream).await;
        write_server_frame(&mut stream, true, OpCode::Text, b"hi").await;
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });

    let (_handle, join) = client::start_link(&url, NoFrameHandler, (), ClientOptions::default())
        .await
        .expect("handshake should succeed");

    let exit = timeout(Duration::from_secs(2), join).await.expect("session timed out").expect("no panic");
    assert!(!exit.normal);
    match exit.reason {
        CloseReason::Error(message) => assert!(message.contains("handle_frame")),
        other => panic!("expected a BadResponseError termination, got {:?}", other),
    }

    timeout(Duration::from_secs(2), server).await.expect("server task timed out").unwrap();
}

struct FragmentOrderHandler {
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Handler for FragmentOrderHandler {
    type State = ();

    async fn handle_frame(&mut self, frame: WsMessage, state: ()) -> Result<HandlerReply<()>, Error> {
        if let WsMessage::Binary(data) = frame {
            self.events.lock().unwrap().push(format!("binary:{:?}", data));
        }
        Ok(HandlerReply::Ok(state))
    }

    async fn handle_ping(&mut self, payload: Option<Vec<u8>>, state: ()) -> Result<HandlerReply<()>, Error> {
        self.events.lock().unwrap().push("ping".to_string());
        Ok(HandlerReply::Reply(WsMessage::Pong(payload), state))
    }
}

#[tokio::test]
async fn fragmented_binary_with_interleaved_ping_preserves_order() {
    let (listener, url) = bind().await;
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_for_assert = events.clone();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        accept_handshake(&mut stream).await;
        write_server_frame(&mut stream, false, OpCode::Binary, &[1, 2]).await;
        write_server_frame(&mut stream, true, OpCode::Ping, &[]).await;
        let _pong = read_client_frame(&mut stream).await;
        write_server_frame(&mut stream, false, OpCode::Continue, &[3]).await;
        write_server_frame(&mut stream, true, OpCode::Continue, &[4]).await;
        write_server_frame(&mut stream, true, OpCode::Close, &1000u16.to_be_bytes()).await;
    });

    let handler = FragmentOrderHandler { events: events.clone() };
    let _handle = client::start(&url, handler, (), ClientOptions::default())
        .await
        .expect("handshake should succeed");

    timeout(Duration::from_secs(2), server).await.expect("server task timed out").unwrap();

    let observed = events_for_assert.lock().unwrap().clone();
    assert_eq!(observed, vec!["ping".to_string(), "binary:[1, 2, 3, 4]".to_string()]);
}
