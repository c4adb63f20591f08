//! The user handler contract (spec §4.4): a capability set of nine callbacks
//! with defaults baked in as trait default methods. There's no single teacher
//! file this is grounded on — the teacher has no callback-driven API at all —
//! so the shape here follows the reply-grammar table in spec §4.4 literally,
//! expressed the way a generic, non-`dyn` Rust trait with async methods is
//! idiomatically written in this pack (`async-trait`, used the same way by
//! `tokio-rs-axum` and `willrnch-fastwebsockets`).

use crate::conn::Conn;
use crate::error::Error;
use crate::message::{CloseReason, WsMessage};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Reply shape shared by every callback that can talk back on the wire:
/// `handle_frame`, `handle_cast`, `handle_info`, `handle_ping`, `handle_pong`.
pub enum HandlerReply<S> {
    Ok(S),
    Reply(WsMessage, S),
    Close(S),
    CloseWith(u16, Vec<u8>, S),
}

/// `handle_disconnect`'s reply shape: either terminate, or reconnect reusing
/// the existing `Conn`.
pub enum DisconnectReply<S> {
    Ok(S),
    Reconnect(S),
}

/// `handle_connect_failure`'s reply shape: either terminate, or reconnect —
/// optionally substituting a different `Conn` for the next attempt.
pub enum ConnectFailureReply<S> {
    Ok(S),
    Reconnect(S),
    ReconnectWith(Conn, S),
}

/// Passed to `handle_connect_failure` (spec §3). Borrows rather than owns:
/// `error` keeps its real variant (`RequestError{code,..}` and friends) alive
/// for the caller of a synchronous `start()` to match on once the callback
/// returns, and `conn` is the `Conn` about to be retried, for a handler that
/// wants to read the target before substituting a replacement.
pub struct ConnectFailure<'a> {
    pub error: &'a Error,
    pub attempt_number: u32,
    pub conn: &'a Conn,
}

/// A message delivered via `cast`/`handle_info`; opaque to the session, the
/// same way the Elixir original's dynamically-typed messages are opaque to
/// the state machine — only the handler's own code knows the concrete type.
pub type OpaqueMessage = Box<dyn Any + Send>;

#[async_trait]
pub trait Handler: Send + 'static {
    /// `Clone` mirrors the Elixir original's immutable terms: `:sys.get_state/1`
    /// hands the caller a snapshot, never a handle into the live state.
    type State: Clone + Send + 'static;

    async fn init(&mut self, state: Self::State, _conn: &Conn) -> Result<Self::State, Error> {
        Ok(state)
    }

    /// No default: an unhandled frame is a programming error the spec asks us
    /// to fail explicitly on, becoming the session's termination reason.
    async fn handle_frame(
        &mut self,
        frame: WsMessage,
        _state: Self::State,
    ) -> Result<HandlerReply<Self::State>, Error> {
        Err(bad_response::<Self>("handle_frame", format!("{:?}", frame)))
    }

    /// No default, for the same reason as `handle_frame`.
    async fn handle_cast(
        &mut self,
        _message: OpaqueMessage,
        _state: Self::State,
    ) -> Result<HandlerReply<Self::State>, Error> {
        Err(bad_response::<Self>("handle_cast", "<opaque cast message>".to_string()))
    }

    async fn handle_info(
        &mut self,
        _message: OpaqueMessage,
        state: Self::State,
    ) -> Result<HandlerReply<Self::State>, Error> {
        log::debug!("unhandled info message, continuing");
        Ok(HandlerReply::Ok(state))
    }

    async fn handle_ping(
        &mut self,
        payload: Option<Vec<u8>>,
        state: Self::State,
    ) -> Result<HandlerReply<Self::State>, Error> {
        Ok(HandlerReply::Reply(WsMessage::Pong(payload), state))
    }

    async fn handle_pong(
        &mut self,
        _payload: Option<Vec<u8>>,
        state: Self::State,
    ) -> Result<HandlerReply<Self::State>, Error> {
        Ok(HandlerReply::Ok(state))
    }

    async fn handle_disconnect(
        &mut self,
        _reason: CloseReason,
        state: Self::State,
    ) -> Result<DisconnectReply<Self::State>, Error> {
        Ok(DisconnectReply::Ok(state))
    }

    async fn handle_connect_failure(
        &mut self,
        _failure: ConnectFailure<'_>,
        state: Self::State,
    ) -> Result<ConnectFailureReply<Self::State>, Error> {
        Ok(ConnectFailureReply::Ok(state))
    }

    async fn terminate(&mut self, _reason: &CloseReason, _state: &Self::State) {}
}

fn bad_response<H: Handler + ?Sized>(callback: &'static str, response: String) -> Error {
    Error::BadResponseError {
        handler: std::any::type_name::<H>(),
        callback,
        response,
    }
}

/// Runs a handler callback, turning a panic into `Error::HandlerPanic` instead of
/// unwinding into the session task — the Rust analogue of the "capture the
/// stacktrace before invoking terminate" design note for a language without
/// supervised processes.
pub(crate) async fn invoke<F, T>(callback: &'static str, fut: F) -> Result<T, Error>
where
    F: std::future::Future<Output = Result<T, Error>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Error::HandlerPanic {
            callback,
            message: panic_message(payload),
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}
