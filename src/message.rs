//! The handler-facing message type: the tagged value handed to `Handler::handle_frame`
//! and friends, distinct from the wire-level `Frame` the codec deals in.

use crate::error::Error;
use crate::frame::{Frame, OpCode};

/// A normal close is code 1000 with no reason, the only code the default handler
/// ever needs to name explicitly.
pub const CLOSE_NORMAL: u16 = 1000;

/// A message handed to the user handler. Control frames never arrive fragmented;
/// a fragmented data message is delivered piece by piece via `Fragment`/
/// `Continuation`/`Finish` before the `Reassembler` folds those into a single
/// `Text`/`Binary` for `Handler::handle_frame`.
#[derive(Debug, Clone, PartialEq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Option<Vec<u8>>),
    Pong(Option<Vec<u8>>),
    Close(Option<(u16, Vec<u8>)>),
    Fragment(FragmentKind, Vec<u8>),
    Continuation(Vec<u8>),
    Finish(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Text,
    Binary,
}

impl WsMessage {
    // Classifies a parsed wire frame per the reassembly rules: FIN=1 non-continuation
    // opcodes are whole messages, FIN=0 data opcodes start a fragment sequence, and
    // Continue-opcode frames are either a middle or terminal piece depending on FIN.
    pub fn from_frame(frame: Frame) -> Result<Self, Error> {
        match (frame.opcode, frame.final_fragment) {
            (OpCode::Text, true) => {
                let text = String::from_utf8(frame.payload).map_err(|_| Error::InvalidUtf8)?;
                Ok(WsMessage::Text(text))
            }
            (OpCode::Binary, true) => Ok(WsMessage::Binary(frame.payload)),
            (OpCode::Text, false) => Ok(WsMessage::Fragment(FragmentKind::Text, frame.payload)),
            (OpCode::Binary, false) => {
                Ok(WsMessage::Fragment(FragmentKind::Binary, frame.payload))
            }
            (OpCode::Continue, true) => Ok(WsMessage::Finish(frame.payload)),
            (OpCode::Continue, false) => Ok(WsMessage::Continuation(frame.payload)),
            (OpCode::Ping, _) => Ok(WsMessage::Ping(none_if_empty(frame.payload))),
            (OpCode::Pong, _) => Ok(WsMessage::Pong(none_if_empty(frame.payload))),
            (OpCode::Close, _) => Ok(WsMessage::Close(parse_close_payload(&frame.payload)?)),
        }
    }

    /// Converts a user-supplied outbound message into the wire frame(s) needed to
    /// send it, splitting into fragments when the payload exceeds `max_frame_size`.
    pub fn into_frames(self, max_frame_size: usize) -> Result<Vec<Frame>, Error> {
        match self {
            WsMessage::Text(text) => {
                Ok(chunk_data_frames(OpCode::Text, text.into_bytes(), max_frame_size))
            }
            WsMessage::Binary(data) => {
                Ok(chunk_data_frames(OpCode::Binary, data, max_frame_size))
            }
            WsMessage::Ping(payload) => {
                let payload = payload.unwrap_or_default();
                check_control_payload(&payload)?;
                Ok(vec![Frame::new(true, OpCode::Ping, payload)])
            }
            WsMessage::Pong(payload) => {
                let payload = payload.unwrap_or_default();
                check_control_payload(&payload)?;
                Ok(vec![Frame::new(true, OpCode::Pong, payload)])
            }
            WsMessage::Close(None) => Ok(vec![Frame::new(true, OpCode::Close, Vec::new())]),
            WsMessage::Close(Some((code, reason))) => {
                if !(1000..=4999).contains(&code) {
                    return Err(Error::InvalidCloseCode(code));
                }
                let mut payload = Vec::with_capacity(2 + reason.len());
                payload.extend_from_slice(&code.to_be_bytes());
                payload.extend_from_slice(&reason);
                check_control_payload(&payload)?;
                Ok(vec![Frame::new(true, OpCode::Close, payload)])
            }
            WsMessage::Fragment(_, _) | WsMessage::Continuation(_) | WsMessage::Finish(_) => {
                // Handlers reply with whole messages; fragmentation is an inbound-only
                // concept reproduced for the handler to observe, not something a reply
                // can ask to send a piece of.
                Err(Error::BadResponseError {
                    handler: "<reply>",
                    callback: "into_frames",
                    response: "attempted to send a raw Fragment/Continuation/Finish piece"
                        .to_string(),
                })
            }
        }
    }
}

fn none_if_empty(payload: Vec<u8>) -> Option<Vec<u8>> {
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

fn parse_close_payload(payload: &[u8]) -> Result<Option<(u16, Vec<u8>)>, Error> {
    if payload.is_empty() {
        return Ok(None);
    }
    if payload.len() < 2 {
        return Err(Error::ControlFramePayloadSize);
    }
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    if !(1000..=4999).contains(&code) {
        return Err(Error::InvalidCloseCode(code));
    }
    Ok(Some((code, payload[2..].to_vec())))
}

fn check_control_payload(payload: &[u8]) -> Result<(), Error> {
    if payload.len() > crate::frame::MAX_CONTROL_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge);
    }
    Ok(())
}

fn chunk_data_frames(opcode: OpCode, payload: Vec<u8>, max_frame_size: usize) -> Vec<Frame> {
    if payload.is_empty() {
        return vec![Frame::new(true, opcode, payload)];
    }

    let mut frames = Vec::new();
    for chunk in payload.chunks(max_frame_size.max(1)) {
        frames.push(Frame::new(
            false,
            if frames.is_empty() { opcode } else { OpCode::Continue },
            chunk.to_vec(),
        ));
    }
    if let Some(last) = frames.last_mut() {
        last.final_fragment = true;
    }
    frames
}

/// The reason a `Session` ended, handed to `Handler::handle_disconnect`/`terminate`.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    Local { code: u16, reason: Vec<u8> },
    Remote { code: u16, reason: Vec<u8> },
    /// The TCP connection dropped without a prior CLOSE frame.
    RemoteClosed,
    Error(String),
}

impl CloseReason {
    pub fn normal_local() -> Self {
        CloseReason::Local {
            code: CLOSE_NORMAL,
            reason: Vec::new(),
        }
    }

    /// `true` when the exit should be reported as normal: code 1000 without body,
    /// on either side.
    pub fn is_normal(&self) -> bool {
        matches!(
            self,
            CloseReason::Local { code: CLOSE_NORMAL, .. }
                | CloseReason::Remote { code: CLOSE_NORMAL, .. }
        )
    }
}
