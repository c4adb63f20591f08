use async_trait::async_trait;
use log::*;
use socket_flow_client::config::ClientOptions;
use socket_flow_client::error::Error;
use socket_flow_client::handler::{ConnectFailure, ConnectFailureReply, DisconnectReply, Handler, HandlerReply};
use socket_flow_client::message::WsMessage;
use socket_flow_client::{client, CloseReason};
use tokio::time::{sleep, Duration};

/// A handler that keeps reconnecting no matter how the connection ends,
/// whether it never came up in the first place or dropped mid-session.
struct ReconnectingHandler;

#[async_trait]
impl Handler for ReconnectingHandler {
    type State = ();

    async fn handle_frame(&mut self, frame: WsMessage, state: ()) -> Result<HandlerReply<()>, Error> {
        if let WsMessage::Text(text) = frame {
            info!("received: {}", text);
        }
        Ok(HandlerReply::Ok(state))
    }

    async fn handle_connect_failure(
        &mut self,
        failure: ConnectFailure<'_>,
        state: (),
    ) -> Result<ConnectFailureReply<()>, Error> {
        warn!("connect attempt {} failed: {}, retrying", failure.attempt_number, failure.error);
        sleep(Duration::from_secs(1)).await;
        Ok(ConnectFailureReply::Reconnect(state))
    }

    async fn handle_disconnect(&mut self, reason: CloseReason, state: ()) -> Result<DisconnectReply<()>, Error> {
        warn!("disconnected: {:?}, reconnecting", reason);
        Ok(DisconnectReply::Reconnect(state))
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let options = ClientOptions {
        async_connect: true,
        ..ClientOptions::default()
    };

    let (handle, join) = client::start_link("ws://127.0.0.1:9002/", ReconnectingHandler, (), options)
        .await
        .expect("spawning the session never fails in async mode");

    while !handle.is_open() {
        sleep(Duration::from_millis(50)).await;
    }
    info!("connected after {} attempt(s)", handle.attempt_number().max(1));

    let exit = join.await.expect("session task panicked");
    info!("session exited: {:?} (normal={})", exit.reason, exit.normal);
}
