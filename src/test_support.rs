//! Loopback websocket servers shared by the network-facing tests.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

pub type ServerSocket = WebSocketStream<TcpStream>;

pub const WAIT: Duration = Duration::from_secs(2);

/// Bind an ephemeral port and return the listener with its `ws://` base URL.
pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    (listener, format!("ws://{addr}"))
}

/// Accept one websocket client.
pub async fn accept(listener: &TcpListener) -> ServerSocket {
    let (tcp, _) = timeout(WAIT, listener.accept())
        .await
        .expect("accept timed out")
        .expect("accept failed");
    accept_async(tcp).await.expect("websocket handshake")
}

/// Receive the next text message, skipping control frames.
pub async fn recv_text(socket: &mut ServerSocket) -> String {
    loop {
        let message = timeout(WAIT, socket.next())
            .await
            .expect("receive timed out")
            .expect("socket ended")
            .expect("socket errored");
        match message {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Close(_) => panic!("socket closed while waiting for text"),
            _ => {}
        }
    }
}

/// Wait until the peer closes or drops the socket.
pub async fn wait_closed(socket: &mut ServerSocket) {
    loop {
        match timeout(WAIT, socket.next()).await.expect("close timed out") {
            None | Some(Err(_) | Ok(Message::Close(_))) => return,
            Some(Ok(_)) => {}
        }
    }
}

/// Wait for the peer to go away; `true` when it sent a close frame first.
pub async fn closed_cleanly(socket: &mut ServerSocket) -> bool {
    loop {
        match timeout(WAIT, socket.next()).await.expect("close timed out") {
            Some(Ok(Message::Close(_))) => return true,
            None | Some(Err(_)) => return false,
            Some(Ok(_)) => {}
        }
    }
}
