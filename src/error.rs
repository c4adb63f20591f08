use crate::message::WsMessage;
use pki_types::InvalidDnsNameError;
use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio::time::error::Elapsed;
use url::ParseError;

#[derive(Error, Debug)]
pub enum Error {
    // Sender / Receiver Errors
    #[error("{source}")]
    SendError {
        #[from]
        source: SendError<WsMessage>,
    },

    #[error("channel communication error")]
    CommunicationError,

    // General Errors
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO Error happened: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    // URL Errors
    #[error("{source}")]
    URLParseError {
        #[from]
        source: ParseError,
    },

    #[error("invalid scheme in WebSocket URL, expected ws or wss")]
    InvalidSchemeURL,

    #[error("URL has no host")]
    URLNoHost,

    #[error("URL has no port, and none could be derived from the scheme")]
    URLNoPort,

    // Connect-time Errors
    #[error("failed to establish the underlying transport: {source}")]
    ConnError {
        #[source]
        source: io::Error,
    },

    #[error("server responded with HTTP status {code} instead of 101 Switching Protocols")]
    RequestError {
        code: u16,
        headers: Vec<(String, String)>,
    },

    #[error("handshake response was not a valid WebSocket upgrade: {reason}")]
    HandshakeError { reason: String, challenge: String },

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: httparse::Error,
    },

    #[error("incomplete HTTP response from the handshake")]
    IncompleteHTTPResponse,

    // Domain addr parsing error
    #[error("{source}")]
    DomainError {
        #[from]
        source: InvalidDnsNameError,
    },

    #[error("{source}")]
    TlsError {
        #[from]
        source: rustls::Error,
    },

    // Framing Errors
    #[error("RSV not zero")]
    RSVNotZero,

    #[error("server frame must not be masked")]
    UnmaskedRequired,

    #[error("Control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("Control frame with invalid payload size, can be greater than 125")]
    ControlFramePayloadSize,

    #[error("Invalid Opcode: {0:#x}")]
    InvalidOpcode(u8),

    #[error("Max frame size reached")]
    MaxFrameSize,

    #[error("Max message size reached")]
    MaxMessageSize,

    #[error("text frame payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("close frame carries an invalid close code: {0}")]
    InvalidCloseCode(u16),

    #[error("payload too large for a control frame")]
    PayloadTooLarge,

    // Fragmentation Errors
    #[error("Invalid frame while there is a fragmented message in progress")]
    InvalidFrameFragmentation,

    #[error("Incoming fragmented message but there is one already in progress")]
    FragmentedInProgress,

    #[error("Invalid continuation frame: no fragmented message to continue")]
    InvalidContinuationFrame,

    // Handler contract Errors
    #[error("handler `{handler}` returned an illegal reply from `{callback}`: {response}")]
    BadResponseError {
        handler: &'static str,
        callback: &'static str,
        response: String,
    },

    #[error("handler callback `{callback}` panicked: {message}")]
    HandlerPanic {
        callback: &'static str,
        message: String,
    },
}

impl Error {
    /// `true` when this happened while establishing the connection, i.e. recoverable
    /// via `Handler::handle_connect_failure` rather than fatal to an open session.
    pub fn is_connect_time(&self) -> bool {
        matches!(
            self,
            Error::ConnError { .. }
                | Error::RequestError { .. }
                | Error::HandshakeError { .. }
                | Error::IOError { .. }
                | Error::Timeout { .. }
        )
    }

    /// Protocol violations on inbound bytes fail the connection with close code 1002.
    pub fn protocol_close_code(&self) -> Option<u16> {
        match self {
            Error::RSVNotZero
            | Error::UnmaskedRequired
            | Error::ControlFramesFragmented
            | Error::ControlFramePayloadSize
            | Error::InvalidOpcode(_)
            | Error::InvalidFrameFragmentation
            | Error::FragmentedInProgress
            | Error::InvalidContinuationFrame
            | Error::InvalidUtf8
            | Error::InvalidCloseCode(_) => Some(1002),
            Error::MaxFrameSize | Error::MaxMessageSize => Some(1009),
            _ => None,
        }
    }
}
