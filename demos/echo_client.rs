use async_trait::async_trait;
use log::*;
use socket_flow_client::config::ClientOptions;
use socket_flow_client::error::Error;
use socket_flow_client::handler::{ConnectFailure, ConnectFailureReply, Handler, HandlerReply};
use socket_flow_client::message::WsMessage;
use socket_flow_client::{client, CloseReason};
use tokio::time::{sleep, Duration};

struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    type State = u32;

    async fn handle_frame(&mut self, frame: WsMessage, state: u32) -> Result<HandlerReply<u32>, Error> {
        if let WsMessage::Text(text) = &frame {
            info!("received: {}", text);
        }
        Ok(HandlerReply::Ok(state + 1))
    }

    async fn handle_connect_failure(
        &mut self,
        failure: ConnectFailure<'_>,
        state: u32,
    ) -> Result<ConnectFailureReply<u32>, Error> {
        error!("connect attempt {} failed: {}", failure.attempt_number, failure.error);
        Ok(ConnectFailureReply::Ok(state))
    }

    async fn terminate(&mut self, reason: &CloseReason, state: &u32) {
        info!("session ended after {} echoes: {:?}", state, reason);
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let handle = client::start("ws://127.0.0.1:9002/", EchoHandler, 0, ClientOptions::default())
        .await
        .expect("couldn't establish the connection");

    for i in 0..5 {
        handle
            .send_frame(WsMessage::Text(format!("hello #{}", i)))
            .expect("send failed");
        sleep(Duration::from_millis(200)).await;
    }

    handle.terminate().expect("mailbox closed");
    sleep(Duration::from_secs(1)).await;
}
