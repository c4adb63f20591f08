//! The library surface (spec §6): `start`/`start_link`/`cast`/`send_frame`.
//! Grounded on the handle/actor split the teacher's `WSReader`/`WSWriter` in
//! `split.rs` already establishes — a cheaply-cloneable handle (`SessionHandle`)
//! paired with a task that owns the real socket, rather than an opaque
//! `session_id` plus a process registry lookup.

use crate::config::ClientOptions;
use crate::conn::Conn;
use crate::dispatcher::{Mailbox, Phase, SystemMsg};
use crate::error::Error;
use crate::handler::Handler;
use crate::message::WsMessage;
use crate::session::{self, SessionExit};
use std::any::Any;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// A live (or once-live) session. Cloning shares the same mailbox and phase
/// feed, mirroring how the Elixir original's `session_id` can be held by any
/// number of producers.
#[derive(Clone)]
pub struct SessionHandle<S> {
    mailbox: mpsc::UnboundedSender<Mailbox<S>>,
    phase_rx: watch::Receiver<Phase>,
    max_frame_size: usize,
}

impl<S> SessionHandle<S>
where
    S: Clone + Send + 'static,
{
    /// Fire-and-forget user message, delivered to `Handler::handle_cast`.
    pub fn cast(&self, message: impl Any + Send + 'static) -> Result<(), Error> {
        self.mailbox
            .send(Mailbox::Cast(Box::new(message)))
            .map_err(|_| Error::CommunicationError)
    }

    /// A message outside the defined protocol, delivered to `Handler::handle_info`.
    pub fn send_info(&self, message: impl Any + Send + 'static) -> Result<(), Error> {
        self.mailbox
            .send(Mailbox::Info(Box::new(message)))
            .map_err(|_| Error::CommunicationError)
    }

    /// Encodes `message` and queues the bytes for the socket. Encode errors
    /// (invalid UTF-8, a bad close code, an oversized control payload) are
    /// returned synchronously, before anything is enqueued.
    pub fn send_frame(&self, message: WsMessage) -> Result<(), Error> {
        for frame in message.into_frames(self.max_frame_size)? {
            let bytes = crate::codec::encode(&frame)?;
            self.mailbox
                .send(Mailbox::SendBytes(bytes.freeze()))
                .map_err(|_| Error::CommunicationError)?;
        }
        Ok(())
    }

    /// A snapshot of the handler's current state (`:sys.get_state/1`'s analogue).
    pub async fn get_state(&self) -> Result<S, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.mailbox
            .send(Mailbox::System(SystemMsg::GetState(reply_tx)))
            .map_err(|_| Error::CommunicationError)?;
        reply_rx.await.map_err(|_| Error::CommunicationError)
    }

    /// Overwrites the handler's state in place, bypassing every callback.
    pub async fn replace_state(&self, state: S) -> Result<(), Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.mailbox
            .send(Mailbox::System(SystemMsg::ReplaceState(state, reply_tx)))
            .map_err(|_| Error::CommunicationError)?;
        reply_rx.await.map_err(|_| Error::CommunicationError)
    }

    /// Initiates a normal local close, the same as a handler returning `{close, s}`.
    pub fn terminate(&self) -> Result<(), Error> {
        self.mailbox
            .send(Mailbox::System(SystemMsg::Terminate))
            .map_err(|_| Error::CommunicationError)
    }

    pub fn phase(&self) -> Phase {
        self.phase_rx.borrow().clone()
    }

    /// `0` outside the Connecting phase; the number of the in-flight (or most
    /// recently completed) connect attempt while Connecting.
    pub fn attempt_number(&self) -> u32 {
        match &*self.phase_rx.borrow() {
            Phase::Connecting { attempt } => *attempt,
            _ => 0,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(&*self.phase_rx.borrow(), Phase::Open)
    }
}

/// Starts a session without linking its failure to the caller. When
/// `options.async_connect` is `false` (the default), this blocks until the
/// initial connect sequence (including any handler-directed retries) reaches
/// either Open or a terminal failure; a terminal failure is returned here
/// rather than only reaching the handler.
pub async fn start<H: Handler>(
    url: &str,
    handler: H,
    initial_state: H::State,
    options: ClientOptions,
) -> Result<SessionHandle<H::State>, Error> {
    let (handle, _join) = spawn(url, handler, initial_state, options).await?;
    Ok(handle)
}

/// Like `start`, but also returns the task's `JoinHandle` so the caller can
/// await the session's terminal `SessionExit` — the Rust analogue of Elixir's
/// `start_link` propagating the linked process's exit to its caller.
pub async fn start_link<H: Handler>(
    url: &str,
    handler: H,
    initial_state: H::State,
    options: ClientOptions,
) -> Result<(SessionHandle<H::State>, JoinHandle<SessionExit>), Error> {
    spawn(url, handler, initial_state, options).await
}

async fn spawn<H: Handler>(
    url: &str,
    handler: H,
    initial_state: H::State,
    options: ClientOptions,
) -> Result<(SessionHandle<H::State>, JoinHandle<SessionExit>), Error> {
    let conn = Conn::new(url, options.clone())?;
    let max_frame_size = options.websocket.max_frame_size;
    let async_connect = options.async_connect;

    let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
    let (phase_tx, phase_rx) = watch::channel(Phase::Connecting { attempt: 1 });

    if async_connect {
        let join = tokio::spawn(session::drive(conn, handler, initial_state, mailbox_rx, phase_tx, None));
        let handle = SessionHandle {
            mailbox: mailbox_tx,
            phase_rx,
            max_frame_size,
        };
        return Ok((handle, join));
    }

    let (ack_tx, ack_rx) = oneshot::channel();
    let join = tokio::spawn(session::drive(
        conn,
        handler,
        initial_state,
        mailbox_rx,
        phase_tx,
        Some(ack_tx),
    ));

    match ack_rx.await {
        Ok(Ok(())) => {
            let handle = SessionHandle {
                mailbox: mailbox_tx,
                phase_rx,
                max_frame_size,
            };
            Ok((handle, join))
        }
        Ok(Err(error)) => Err(error),
        Err(_) => Err(Error::CommunicationError),
    }
}
