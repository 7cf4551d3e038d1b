// Shared helpers: a real relay, a scripted relay, and bounded waits.
#![allow(dead_code)]

use axum::{
    Router,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use relay_server::RelaySettings;
use scan_client::{ConnectionState, Role, TransportSession, TransportSettings};
use serde_json::Value;
use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;

// Upper bound for any single wait so a broken path fails instead of hanging.
pub const WAIT: Duration = Duration::from_secs(3);

// A fresh relay per test keeps presence counts isolated.
pub async fn start_relay() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr = listener.local_addr().expect("get local addr");
    tokio::spawn(async move {
        relay_server::run_with_settings(listener, RelaySettings::default(), std::future::pending())
            .await
            .expect("relay failed");
    });
    addr
}

pub fn client_settings(addr: SocketAddr, role: Role) -> TransportSettings {
    let mut settings = TransportSettings::new(format!("ws://{addr}/ws"), role);
    settings.reconnect_attempts = 3;
    settings.reconnect_delay = Duration::from_millis(50);
    settings.connect_timeout = Duration::from_secs(2);
    settings
}

pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

pub async fn wait_for_state(
    session: &TransportSession,
    mut accept: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    let mut states = session.subscribe_state();
    let state = tokio::time::timeout(WAIT, states.wait_for(|state| accept(state)))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
    *state
}

pub async fn wait_for_epoch(session: &TransportSession, epoch: u64) {
    use scan_client::domain::ScanPublisher;

    tokio::time::timeout(WAIT, async {
        while session.connection_epoch() < epoch {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for reconnect");
}

/// Relay stand-in that records every text frame per connection and can
/// cut the first connection or refuse new ones.
pub struct ScriptedRelay {
    upgrades: AtomicUsize,
    // Connections beyond this many are answered with 503.
    accept_limit: usize,
    // The first connection is closed right after this event arrives.
    drop_first_on: &'static str,
    seen: mpsc::UnboundedSender<(usize, Value)>,
}

impl ScriptedRelay {
    pub async fn start(
        accept_limit: usize,
        drop_first_on: &'static str,
    ) -> (SocketAddr, mpsc::UnboundedReceiver<(usize, Value)>) {
        let (seen, seen_rx) = mpsc::unbounded_channel();
        let relay = Arc::new(ScriptedRelay {
            upgrades: AtomicUsize::new(0),
            accept_limit,
            drop_first_on,
            seen,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral test port");
        let addr = listener.local_addr().expect("get local addr");
        let app = Router::new()
            .route("/ws", get(scripted_ws))
            .with_state(relay);
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("scripted relay failed");
        });
        (addr, seen_rx)
    }
}

async fn scripted_ws(State(relay): State<Arc<ScriptedRelay>>, ws: WebSocketUpgrade) -> Response {
    let connection = relay.upgrades.fetch_add(1, Ordering::SeqCst) + 1;
    if connection > relay.accept_limit {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| serve_script(socket, relay, connection))
        .into_response()
}

async fn serve_script(mut socket: WebSocket, relay: Arc<ScriptedRelay>, connection: usize) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let drop_now = connection == 1 && value["event"] == relay.drop_first_on;
        let _ = relay.seen.send((connection, value));

        if drop_now {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: "restarting".into(),
                })))
                .await;
            return;
        }
    }
}
