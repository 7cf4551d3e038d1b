// Turns relay feedback and connection changes into user-facing log lines.

use crate::interface_adapters::protocol::{ServerEventKind, ServerMessage};
use crate::interface_adapters::transport::{ConnectionState, TransportSession};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Logs presence, delivery confirmations and rejections as they arrive.
pub fn attach_status_logging(session: &TransportSession) {
    session.on_event(ServerEventKind::SessionInfo, |message| {
        if let ServerMessage::SessionInfo(info) = message {
            tracing::info!(session_id = %info.session_id, role = %info.role, "registered with relay");
        }
    });

    session.on_event(ServerEventKind::PresenceUpdate, |message| {
        if let ServerMessage::PresenceUpdate(presence) = message {
            if presence.consumer_count == 0 {
                tracing::info!("no consumers connected; scans will not be delivered");
            } else {
                tracing::info!(consumer_count = presence.consumer_count, "consumers connected");
            }
        }
    });

    session.on_event(ServerEventKind::ScanDelivered, |message| {
        if let ServerMessage::ScanDelivered(delivery) = message {
            if delivery.delivered_to == 0 {
                tracing::info!("scan reached the relay but no consumer is listening");
            } else {
                tracing::info!(delivered_to = delivery.delivered_to, "scan delivered");
            }
        }
    });

    session.on_event(ServerEventKind::ScanRejected, |message| {
        if let ServerMessage::ScanRejected(rejection) = message {
            tracing::warn!(reason = %rejection.reason, "scan rejected by relay");
        }
    });
}

/// Follows the connection state until it becomes terminal.
pub fn spawn_state_watcher(mut states: watch::Receiver<ConnectionState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let state = *states.borrow_and_update();
            match state {
                ConnectionState::Connecting => tracing::info!("connecting to relay"),
                ConnectionState::Connected => tracing::info!("connected"),
                ConnectionState::Reconnecting { attempt } => {
                    tracing::warn!(attempt, "connection lost; reconnecting")
                }
                ConnectionState::Disconnected => {
                    tracing::error!("relay unreachable; restart the client to try again");
                    return;
                }
                ConnectionState::Closed => return,
            }
            if states.changed().await.is_err() {
                return;
            }
        }
    })
}
