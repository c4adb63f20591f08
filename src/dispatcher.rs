//! The event loop proper (spec §4.6): a single `select!` over socket bytes
//! and the session's mailbox — the close-timer lives in the Closing phase,
//! not here. Grounded on the reader/writer split the teacher's `split.rs`
//! establishes, generalized from a raw frame stream into a mailbox of typed
//! messages per the "single select/match on channel + socket" design note in
//! spec §9.

use crate::conn::Conn;
use crate::error::Error;
use crate::frame::Frame;
use crate::handler::{self, Handler, HandlerReply, OpaqueMessage};
use crate::message::WsMessage;
use crate::reassembler::Reassembler;
use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};

/// Live phase, mirrored out via a `watch` channel so `SessionHandle` can answer
/// `attempt_number()`/`is_open()` without round-tripping through the mailbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Connecting { attempt: u32 },
    Open,
    Closing,
    Disconnect,
    Terminated,
}

/// Everything a producer can put in a session's mailbox.
pub enum Mailbox<S> {
    /// Fire-and-forget user message (`cast`).
    Cast(OpaqueMessage),
    /// A message with no defined place in the protocol; dispatched to
    /// `handle_info` (spec §4.6 item 7).
    Info(OpaqueMessage),
    /// Pre-encoded bytes from `send_frame`; encoding already happened on the
    /// caller's side so encode errors surface synchronously to them.
    SendBytes(Bytes),
    System(SystemMsg<S>),
}

pub enum SystemMsg<S> {
    GetState(oneshot::Sender<S>),
    ReplaceState(S, oneshot::Sender<()>),
    /// A no-op resume signal; present for parity with the admin message set
    /// spec §4.6 names even though nothing in this crate currently pauses.
    Continue,
    Terminate,
}

/// What ended the Open phase's loop; consumed by the Closing phase.
pub(crate) enum OpenExit {
    LocalClose { code: u16, reason: Vec<u8> },
    RemoteClose { code: u16, reason: Vec<u8> },
    RemoteClosed,
    Fatal(Error),
}

/// Runs the Open-phase loop until a close trigger fires. One frame is parsed
/// and dispatched per iteration at most (spec §4.5 ordering rule) before
/// control returns to the `select!`, so sends and casts can't starve behind a
/// flood of inbound bytes.
pub(crate) async fn run<H: Handler>(
    conn: &mut Conn,
    handler: &mut H,
    state: &mut H::State,
    reassembler: &mut Reassembler,
    inbound: &mut BytesMut,
    mailbox: &mut mpsc::UnboundedReceiver<Mailbox<H::State>>,
) -> OpenExit {
    let max_frame_size = conn.options.websocket.max_frame_size;

    loop {
        match crate::codec::parse(inbound, max_frame_size) {
            Ok(Some(frame)) => match dispatch_frame(conn, handler, state, reassembler, frame).await {
                Ok(Some(exit)) => return exit,
                Ok(None) => continue,
                Err(error) => return fatal_or_protocol(error),
            },
            Ok(None) => {}
            Err(error) => return fatal_or_protocol(error),
        }

        tokio::select! {
            biased;

            result = conn.recv(inbound) => {
                match result {
                    Ok(0) => return OpenExit::RemoteClosed,
                    Ok(_) => {}
                    Err(error) => return OpenExit::Fatal(error),
                }
            }

            incoming = mailbox.recv() => {
                let Some(message) = incoming else {
                    return OpenExit::Fatal(Error::CommunicationError);
                };
                if let Some(exit) = handle_mailbox(conn, handler, state, message).await {
                    return exit;
                }
            }
        }
    }
}

fn fatal_or_protocol(error: Error) -> OpenExit {
    match error.protocol_close_code() {
        Some(code) => OpenExit::LocalClose {
            code,
            reason: error.to_string().into_bytes(),
        },
        None => OpenExit::Fatal(error),
    }
}

/// Classifies one wire frame, folds it through the reassembler, and invokes
/// the matching handler callback. Returns `Some(exit)` when the reply (or a
/// Close frame from the peer) ends the Open phase.
async fn dispatch_frame<H: Handler>(
    conn: &mut Conn,
    handler: &mut H,
    state: &mut H::State,
    reassembler: &mut Reassembler,
    frame: Frame,
) -> Result<Option<OpenExit>, Error> {
    let classified = WsMessage::from_frame(frame)?;
    let Some(message) = reassembler.feed(classified)? else {
        return Ok(None);
    };

    match message {
        WsMessage::Close(body) => {
            let (code, reason) = body.unwrap_or((crate::message::CLOSE_NORMAL, Vec::new()));
            Ok(Some(OpenExit::RemoteClose { code, reason }))
        }
        WsMessage::Ping(payload) => {
            let reply = handler::invoke("handle_ping", handler.handle_ping(payload, state.clone())).await?;
            apply_reply(conn, reply, state).await
        }
        WsMessage::Pong(payload) => {
            let reply = handler::invoke("handle_pong", handler.handle_pong(payload, state.clone())).await?;
            apply_reply(conn, reply, state).await
        }
        whole @ (WsMessage::Text(_) | WsMessage::Binary(_)) => {
            let reply = handler::invoke("handle_frame", handler.handle_frame(whole, state.clone())).await?;
            apply_reply(conn, reply, state).await
        }
        WsMessage::Fragment(..) | WsMessage::Continuation(_) | WsMessage::Finish(_) => {
            unreachable!("the reassembler only ever yields whole messages or control frames")
        }
    }
}

/// Turns a `HandlerReply` into the next state and, if it names one, an
/// `OpenExit`. A reply frame is encoded and sent synchronously before the
/// loop re-enters (spec §4.5); a send error there is fatal.
async fn apply_reply<S>(conn: &mut Conn, reply: HandlerReply<S>, state: &mut S) -> Result<Option<OpenExit>, Error>
where
    S: Clone,
{
    match reply {
        HandlerReply::Ok(s) => {
            *state = s;
            Ok(None)
        }
        HandlerReply::Reply(message, s) => {
            send_reply(conn, message).await?;
            *state = s;
            Ok(None)
        }
        HandlerReply::Close(s) => {
            *state = s;
            Ok(Some(OpenExit::LocalClose {
                code: crate::message::CLOSE_NORMAL,
                reason: Vec::new(),
            }))
        }
        HandlerReply::CloseWith(code, reason, s) => {
            *state = s;
            Ok(Some(OpenExit::LocalClose { code, reason }))
        }
    }
}

async fn send_reply(conn: &mut Conn, message: WsMessage) -> Result<(), Error> {
    let max_frame_size = conn.options.websocket.max_frame_size;
    for frame in message.into_frames(max_frame_size)? {
        conn.send_frame(&frame).await?;
    }
    Ok(())
}

async fn handle_mailbox<H: Handler>(
    conn: &mut Conn,
    handler: &mut H,
    state: &mut H::State,
    message: Mailbox<H::State>,
) -> Option<OpenExit> {
    match message {
        Mailbox::SendBytes(bytes) => match conn.send_bytes(&bytes).await {
            Ok(()) => None,
            Err(error) => Some(OpenExit::Fatal(error)),
        },
        Mailbox::Cast(payload) => {
            run_opaque_callback(conn, "handle_cast", handler, state, payload, |h, m, s| h.handle_cast(m, s)).await
        }
        Mailbox::Info(payload) => {
            run_opaque_callback(conn, "handle_info", handler, state, payload, |h, m, s| h.handle_info(m, s)).await
        }
        Mailbox::System(system) => handle_system(conn, state, system).await,
    }
}

async fn run_opaque_callback<H, F>(
    conn: &mut Conn,
    callback: &'static str,
    handler: &mut H,
    state: &mut H::State,
    payload: OpaqueMessage,
    call: F,
) -> Option<OpenExit>
where
    H: Handler,
    F: for<'h> FnOnce(
        &'h mut H,
        OpaqueMessage,
        H::State,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<HandlerReply<H::State>, Error>> + Send + 'h>,
    >,
{
    let reply = handler::invoke(callback, call(handler, payload, state.clone())).await;
    match reply {
        Ok(reply) => match apply_reply(conn, reply, state).await {
            Ok(exit) => exit,
            Err(error) => Some(OpenExit::Fatal(error)),
        },
        Err(error) => Some(OpenExit::Fatal(error)),
    }
}

async fn handle_system<S>(_conn: &mut Conn, state: &mut S, system: SystemMsg<S>) -> Option<OpenExit>
where
    S: Clone,
{
    match system {
        SystemMsg::GetState(reply) => {
            let _ = reply.send(state.clone());
            None
        }
        SystemMsg::ReplaceState(new_state, reply) => {
            *state = new_state;
            let _ = reply.send(());
            None
        }
        SystemMsg::Continue => None,
        SystemMsg::Terminate => Some(OpenExit::LocalClose {
            code: crate::message::CLOSE_NORMAL,
            reason: Vec::new(),
        }),
    }
}
