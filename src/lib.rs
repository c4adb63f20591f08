//! A WebSocket client for the Tokio stack: RFC 6455 handshake, frame codec,
//! a per-connection state machine (connecting/open/closing/disconnect), and
//! a dispatch loop that drives a user-supplied [`Handler`] through connect
//! failures, inbound frames, casts, and reconnection.
//!
//! ```no_run
//! use socket_flow_client::{client, config::ClientOptions, handler::{Handler, HandlerReply}, message::WsMessage};
//! use async_trait::async_trait;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Handler for Echo {
//!     type State = ();
//!
//!     async fn handle_frame(
//!         &mut self,
//!         frame: WsMessage,
//!         state: (),
//!     ) -> Result<HandlerReply<()>, socket_flow_client::error::Error> {
//!         Ok(HandlerReply::Reply(frame, state))
//!     }
//! }
//!
//! # async fn run() -> Result<(), socket_flow_client::error::Error> {
//! let handle = client::start("ws://localhost:8080/echo", Echo, (), ClientOptions::default()).await?;
//! handle.send_frame(WsMessage::Text("hello".to_string()))?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod conn;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod message;
pub mod reassembler;
pub mod session;
pub mod transport;
pub mod url;
mod utils;

pub use client::{start, start_link, SessionHandle};
pub use config::ClientOptions;
pub use conn::Conn;
pub use error::Error;
pub use frame::{Frame, OpCode};
pub use handler::{ConnectFailure, ConnectFailureReply, DisconnectReply, Handler, HandlerReply};
pub use message::{CloseReason, FragmentKind, WsMessage};
pub use session::SessionExit;
