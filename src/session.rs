//! The Session state machine (spec §4.5): Connecting → Open → Closing →
//! Disconnect → Terminated, with reconnection loops back to Connecting. No
//! single teacher file covers this — the teacher has no reconnect/handler
//! lifecycle at all — so the phase shape here follows spec §4.5 literally,
//! expressed as a loop over owned values the way the teacher's `server.rs`
//! drives its own simpler accept loop.

use crate::conn::Conn;
use crate::dispatcher::{self, Mailbox, OpenExit, Phase};
use crate::error::Error;
use crate::handler::{self, ConnectFailure, ConnectFailureReply, DisconnectReply, Handler};
use crate::message::{CloseReason, WsMessage};
use crate::reassembler::Reassembler;
use bytes::BytesMut;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::sleep;

/// What the session ultimately exited with. `normal` mirrors the Elixir
/// original's `:normal` exit status: true for code 1000 without a body.
pub struct SessionExit {
    pub reason: CloseReason,
    pub normal: bool,
}

pub(crate) async fn drive<H: Handler>(
    mut conn: Conn,
    mut handler: H,
    initial_state: H::State,
    mut mailbox: mpsc::UnboundedReceiver<Mailbox<H::State>>,
    phase_tx: watch::Sender<Phase>,
    mut first_connect_ack: Option<oneshot::Sender<Result<(), Error>>>,
) -> SessionExit {
    let mut state = match handler::invoke("init", handler.init(initial_state.clone(), &conn)).await {
        Ok(state) => state,
        Err(error) => {
            let exit = terminate_now(&mut handler, initial_state, &error, &phase_tx).await;
            if let Some(ack) = first_connect_ack.take() {
                let _ = ack.send(Err(error));
            }
            return exit;
        }
    };

    let mut attempt: u32 = 1;

    loop {
        // `first_connect_ack` is consumed on its first use below, so later
        // iterations (reconnects) are naturally silent to the `start()` caller.
        let outcome = run_connecting(conn, &mut handler, state, attempt, &phase_tx).await;

        let (new_conn, new_state) = match outcome {
            ConnectOutcome::Open { conn, state } => {
                if let Some(ack) = first_connect_ack.take() {
                    let _ = ack.send(Ok(()));
                }
                (conn, state)
            }
            ConnectOutcome::Failed { error, state } => {
                let exit = terminate_now(&mut handler, state, &error, &phase_tx).await;
                if let Some(ack) = first_connect_ack.take() {
                    let _ = ack.send(Err(error));
                }
                return exit;
            }
        };
        conn = new_conn;
        state = new_state;

        let _ = phase_tx.send(Phase::Open);
        log::debug!("session open, entering dispatch loop");

        let max_message_size = conn.options.websocket.max_message_size;
        let mut inbound = BytesMut::new();
        let mut reassembler = Reassembler::new(max_message_size);

        let exit = dispatcher::run(&mut conn, &mut handler, &mut state, &mut reassembler, &mut inbound, &mut mailbox).await;

        let _ = phase_tx.send(Phase::Closing);
        let close_timeout = conn.options.close_timeout;
        let trigger = match exit {
            OpenExit::LocalClose { code, reason } => CloseTrigger::Local { code, reason },
            OpenExit::RemoteClose { code, reason } => CloseTrigger::Remote { code, reason },
            OpenExit::RemoteClosed => CloseTrigger::RemoteClosed,
            OpenExit::Fatal(error) => CloseTrigger::Error(error),
        };
        let close_reason = run_closing(&mut conn, trigger, close_timeout).await;
        log::debug!("closed: {:?}", close_reason);

        let _ = phase_tx.send(Phase::Disconnect);
        match run_disconnect(&mut handler, state, close_reason).await {
            DisconnectOutcome::Terminate { state, reason } => {
                run_terminate(&mut handler, state, &reason).await;
                let _ = phase_tx.send(Phase::Terminated);
                return SessionExit { normal: reason.is_normal(), reason };
            }
            DisconnectOutcome::Reconnect { state: s } => {
                state = s;
                attempt = 1;
            }
        }
    }
}

async fn terminate_now<H: Handler>(
    handler: &mut H,
    state: H::State,
    error: &Error,
    phase_tx: &watch::Sender<Phase>,
) -> SessionExit {
    let reason = CloseReason::Error(error.to_string());
    run_terminate(handler, state, &reason).await;
    let _ = phase_tx.send(Phase::Terminated);
    SessionExit { normal: reason.is_normal(), reason }
}

pub(crate) enum ConnectOutcome<H: Handler> {
    Open { conn: Conn, state: H::State },
    Failed { error: Error, state: H::State },
}

/// Drives the Connecting phase: dial + handshake, and on failure defer to
/// `handle_connect_failure` for a `{ok,s}` (report & terminate) or
/// `{reconnect,…}` (retry, optionally with a replacement `Conn`) decision.
pub(crate) async fn run_connecting<H: Handler>(
    mut conn: Conn,
    handler: &mut H,
    mut state: H::State,
    mut attempt: u32,
    phase_tx: &watch::Sender<Phase>,
) -> ConnectOutcome<H> {
    loop {
        let _ = phase_tx.send(Phase::Connecting { attempt });
        log::debug!("dialing {} (attempt {})", conn.url.authority, attempt);

        match conn.open().await {
            Ok(()) => return ConnectOutcome::Open { conn, state },
            Err(error) => {
                log::warn!("connect attempt {} failed: {}", attempt, error);
                let state_snapshot = state.clone();
                let failure = ConnectFailure {
                    error: &error,
                    attempt_number: attempt,
                    conn: &conn,
                };

                let reply = handler::invoke(
                    "handle_connect_failure",
                    handler.handle_connect_failure(failure, state),
                )
                .await;

                match reply {
                    Ok(ConnectFailureReply::Ok(s)) => {
                        return ConnectOutcome::Failed { error, state: s };
                    }
                    Ok(ConnectFailureReply::Reconnect(s)) => {
                        state = s;
                        attempt += 1;
                    }
                    Ok(ConnectFailureReply::ReconnectWith(new_conn, s)) => {
                        conn = new_conn;
                        state = s;
                        attempt += 1;
                    }
                    Err(callback_error) => {
                        return ConnectOutcome::Failed {
                            error: callback_error,
                            state: state_snapshot,
                        };
                    }
                }
            }
        }
    }
}

enum CloseTrigger {
    Local { code: u16, reason: Vec<u8> },
    Remote { code: u16, reason: Vec<u8> },
    RemoteClosed,
    Error(Error),
}

/// Runs the Closing phase's best-effort close handshake and 5-second grace
/// timer (spec §4.5), returning the reason the session will report.
async fn run_closing(conn: &mut Conn, trigger: CloseTrigger, close_timeout: Duration) -> CloseReason {
    match trigger {
        CloseTrigger::RemoteClosed => CloseReason::RemoteClosed,
        CloseTrigger::Error(error) => CloseReason::Error(error.to_string()),
        CloseTrigger::Remote { code, reason } => {
            let _ = send_close_frame(conn, None).await;
            close_loop(conn, close_timeout).await;
            CloseReason::Remote { code, reason }
        }
        CloseTrigger::Local { code, reason } => {
            let sent = send_close_frame(conn, Some((code, reason.clone()))).await;
            if sent.is_err() {
                conn.close().await;
                return CloseReason::RemoteClosed;
            }
            close_loop(conn, close_timeout).await;
            CloseReason::Local { code, reason }
        }
    }
}

async fn send_close_frame(conn: &mut Conn, payload: Option<(u16, Vec<u8>)>) -> Result<(), Error> {
    for frame in WsMessage::Close(payload).into_frames(usize::MAX)? {
        conn.send_frame(&frame).await?;
    }
    Ok(())
}

/// Discards inbound bytes until the peer drops the TCP connection or the
/// grace timer elapses, then force-closes the socket either way.
async fn close_loop(conn: &mut Conn, close_timeout: Duration) {
    let mut discard = BytesMut::new();
    let timer = sleep(close_timeout);
    tokio::pin!(timer);
    loop {
        tokio::select! {
            _ = &mut timer => {
                conn.close().await;
                return;
            }
            result = conn.recv(&mut discard) => {
                match result {
                    Ok(0) | Err(_) => {
                        conn.close().await;
                        return;
                    }
                    Ok(_) => discard.clear(),
                }
            }
        }
    }
}

pub(crate) enum DisconnectOutcome<H: Handler> {
    Terminate { state: H::State, reason: CloseReason },
    Reconnect { state: H::State },
}

async fn run_disconnect<H: Handler>(handler: &mut H, state: H::State, reason: CloseReason) -> DisconnectOutcome<H> {
    let state_snapshot = state.clone();
    let reply = handler::invoke("handle_disconnect", handler.handle_disconnect(reason.clone(), state)).await;
    match reply {
        Ok(DisconnectReply::Ok(s)) => DisconnectOutcome::Terminate { state: s, reason },
        Ok(DisconnectReply::Reconnect(s)) => DisconnectOutcome::Reconnect { state: s },
        Err(error) => DisconnectOutcome::Terminate {
            state: state_snapshot,
            reason: CloseReason::Error(error.to_string()),
        },
    }
}

async fn run_terminate<H: Handler>(handler: &mut H, state: H::State, reason: &CloseReason) {
    let outcome = handler::invoke("terminate", async move {
        handler.terminate(reason, &state).await;
        Ok::<(), Error>(())
    })
    .await;
    if let Err(error) = outcome {
        log::error!("terminate callback panicked: {}", error);
    }
}
