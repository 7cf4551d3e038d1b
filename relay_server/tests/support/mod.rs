// Shared helpers for booting a relay server and driving it with raw WebSocket clients.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use relay_server::RelaySettings;
use serde_json::{Value, json};
use std::{net::SocketAddr, time::Duration};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};

// Upper bound for any single read so a broken server fails the test instead of hanging it.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

// Start a fresh server on an ephemeral port inside the current test runtime.
// Each test gets its own hub so presence counts never leak between tests.
pub async fn start_server(settings: RelaySettings) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr = listener.local_addr().expect("get local addr");
    tokio::spawn(async move {
        relay_server::run_with_settings(listener, settings, std::future::pending())
            .await
            .expect("server failed");
    });
    addr
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (stream, _response) = connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("websocket handshake should succeed");
        Self { stream }
    }

    // Connect, announce a role and consume the session_info confirmation.
    pub async fn announce(addr: SocketAddr, role: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client
            .send(json!({"event": "client_info", "data": {"role": role}}))
            .await;
        let info = client.recv_json().await;
        assert_eq!(info["event"], "session_info");
        client
    }

    pub async fn send(&mut self, value: Value) {
        self.stream
            .send(Message::Text(value.to_string().into()))
            .await
            .expect("send should succeed");
    }

    // Next text frame as raw JSON text.
    pub async fn recv_text(&mut self) -> String {
        match self.try_recv_text(RECV_TIMEOUT).await {
            Some(text) => text,
            None => panic!("expected a text message"),
        }
    }

    pub async fn recv_json(&mut self) -> Value {
        let text = self.recv_text().await;
        serde_json::from_str(&text).expect("server sent valid json")
    }

    // Returns None on timeout or when the connection ends.
    pub async fn try_recv_text(&mut self, wait: Duration) -> Option<String> {
        loop {
            let next = tokio::time::timeout(wait, self.stream.next()).await.ok()??;
            match next.ok()? {
                Message::Text(text) => return Some(text.to_string()),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }

    // Waits for the server to close the connection and returns its close frame.
    pub async fn expect_close(&mut self) -> Option<CloseFrame> {
        loop {
            let next = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("server should close the connection");
            match next {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    }
}

pub fn scan(payload: &str, symbology: &str) -> Value {
    json!({
        "event": "scan_event",
        "data": {
            "payload": payload,
            "symbology": symbology,
            "capturedAt": 1_700_000_000_000u64
        }
    })
}
