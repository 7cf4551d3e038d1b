use crate::domain::{RelayError, Role, SessionId, TerminationReason};
use crate::interface_adapters::protocol::{
    ClientMessage, PresenceUpdateDto, ScanDeliveredDto, ScanEventDto, ScanRejectedDto,
    ServerMessage, SessionInfoDto,
};
use crate::interface_adapters::state::{AppState, ConnectionSettings};
use crate::use_cases::{Outbound, RelayHub};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    RoleAnnouncementRequired,
    RoleAnnouncementTimeout,
    ClosedBeforeAnnouncement,
    #[allow(dead_code)]
    Rejected(RelayError),
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

enum LoopControl {
    Continue,
    Disconnect(TerminationReason),
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        // Identity is allocated per connection; a reconnect always gets a new one.
        let session_id = SessionId::generate();
        let span = info_span!("conn", %session_id, role = tracing::field::Empty);
        handle_socket(socket, state, session_id).instrument(span)
    })
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, session_id: SessionId) {
    let announcement = match timeout(
        state.connection.role_announce_timeout,
        read_role_announcement(&mut socket),
    )
    .await
    {
        Ok(Ok(announcement)) => announcement,
        Ok(Err(NetError::ClosedBeforeAnnouncement)) => {
            info!("client disconnected before role announcement");
            return;
        }
        Ok(Err(e)) => {
            warn!(error = ?e, "role announcement failed");
            return;
        }
        Err(_) => {
            let _ =
                send_close_with_reason(&mut socket, close_code::POLICY, "role announcement timeout")
                    .await;
            warn!(error = ?NetError::RoleAnnouncementTimeout, "role announcement failed");
            return;
        }
    };
    let role = announcement.role;
    tracing::Span::current().record("role", role.as_str());

    let Some(mut ctx) = bootstrap_session(
        &mut socket,
        &state.hub,
        &state.connection,
        session_id,
        announcement,
    )
    .await
    else {
        return;
    };

    info!(
        platform = ctx.platform.as_deref().unwrap_or("unknown"),
        "client connected"
    );

    // Main Client Loop
    run_client_loop(&mut socket, &mut ctx).await;
}

#[derive(Debug)]
struct RoleAnnouncement {
    role: Role,
    platform: Option<String>,
    bytes_in: u64,
    msgs_in: u64,
}

async fn read_role_announcement(socket: &mut WebSocket) -> Result<RoleAnnouncement, NetError> {
    let mut msgs_in = 0;
    let mut bytes_in = 0;
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeAnnouncement);
        };

        match incoming? {
            Message::Text(text) => {
                msgs_in += 1;
                bytes_in += text.len() as u64;
                let info = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::ClientInfo(info)) => info,
                    // Clients may start their heartbeat timer before announcing.
                    Ok(ClientMessage::Heartbeat) => continue,
                    Ok(_) => {
                        let _ = send_close_with_reason(
                            socket,
                            close_code::POLICY,
                            "role announcement required",
                        )
                        .await;
                        return Err(NetError::RoleAnnouncementRequired);
                    }
                    Err(_) => {
                        let _ = send_close_with_reason(
                            socket,
                            close_code::POLICY,
                            "invalid role announcement",
                        )
                        .await;
                        return Err(NetError::RoleAnnouncementRequired);
                    }
                };

                let role = match info.role.parse::<Role>() {
                    Ok(role) => role,
                    Err(e) => {
                        let _ =
                            send_close_with_reason(socket, close_code::POLICY, "invalid role").await;
                        return Err(NetError::Rejected(e));
                    }
                };

                return Ok(RoleAnnouncement {
                    role,
                    platform: info.platform,
                    bytes_in,
                    msgs_in,
                });
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Err(NetError::RoleAnnouncementRequired);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeAnnouncement),
        }
    }
}

struct ConnCtx {
    session_id: SessionId,
    role: Role,
    platform: Option<String>,
    hub: Arc<Mutex<RelayHub>>,
    // Messages the hub pushes to this session (presence, relayed scans, termination).
    outbound_rx: mpsc::Receiver<Outbound>,

    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,

    invalid_json: u32,
    last_invalid_log: Instant,

    close_frame: Option<CloseFrame>,
}

async fn bootstrap_session(
    socket: &mut WebSocket,
    hub: &Arc<Mutex<RelayHub>>,
    settings: &ConnectionSettings,
    session_id: SessionId,
    announcement: RoleAnnouncement,
) -> Option<ConnCtx> {
    let role = announcement.role;
    let (outbound_tx, outbound_rx) = mpsc::channel::<Outbound>(settings.outbound_capacity);

    // Registration may queue a presence snapshot, so it happens after the channel exists.
    let registered = hub
        .lock()
        .await
        .register_session(session_id, role, outbound_tx, Instant::now());
    if let Err(e) = registered {
        warn!(error = %e, "session registration rejected");
        let _ = send_close_with_reason(socket, close_code::POLICY, "registration rejected").await;
        return None;
    }

    // Tell the client "This is who you are".
    let info_msg = ServerMessage::SessionInfo(SessionInfoDto::new(session_id, role));
    let bytes_out = match send_message(socket, &info_msg).await {
        Ok(bytes) => bytes as u64,
        Err(e) => {
            warn!(error = ?e, "failed to send session info");
            hub.lock()
                .await
                .unregister_session(&session_id, TerminationReason::Closed);
            return None;
        }
    };

    Some(ConnCtx {
        session_id,
        role,
        platform: announcement.platform,
        hub: Arc::clone(hub),
        outbound_rx,

        msgs_in: announcement.msgs_in,
        msgs_out: 1,
        bytes_in: announcement.bytes_in,
        bytes_out,

        invalid_json: 0,
        last_invalid_log: Instant::now() - LOG_THROTTLE,

        close_frame: None,
    })
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) {
    let reason = loop {
        let control = tokio::select! {
            // Incoming Message from Client
            incoming = socket.recv() => handle_incoming_ws(socket, incoming, ctx).await,

            // Outgoing message queued by the hub
            outbound = ctx.outbound_rx.recv() => forward_outbound(socket, outbound, ctx).await,
        };

        if let LoopControl::Disconnect(reason) = control {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break reason;
        }
    };

    disconnect_cleanup(ctx, reason).await;
}

async fn handle_incoming_ws(
    socket: &mut WebSocket,
    incoming: Option<Result<Message, Error>>,
    ctx: &mut ConnCtx,
) -> LoopControl {
    let message = match incoming {
        Some(Ok(message)) => message,
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            return LoopControl::Disconnect(TerminationReason::Closed);
        }
        None => {
            info!("websocket closed");
            return LoopControl::Disconnect(TerminationReason::Closed);
        }
    };

    let text = match message {
        Message::Text(text) => text,
        Message::Binary(_) => {
            ctx.close_frame = Some(CloseFrame {
                code: close_code::UNSUPPORTED,
                reason: "binary messages not supported".into(),
            });
            return LoopControl::Disconnect(TerminationReason::Rejected);
        }
        Message::Ping(_) | Message::Pong(_) => return LoopControl::Continue,
        Message::Close(_) => return LoopControl::Disconnect(TerminationReason::Closed),
    };

    ctx.msgs_in += 1;
    ctx.bytes_in += text.len() as u64;

    let client_message = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(message) => message,
        Err(parse_err) => {
            ctx.invalid_json += 1;
            if should_log(&mut ctx.last_invalid_log) {
                warn!(
                    bytes = text.len(),
                    error = %parse_err,
                    "failed to parse client message"
                );
            }
            if ctx.invalid_json > MAX_INVALID_JSON {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "too many invalid messages".into(),
                });
                return LoopControl::Disconnect(TerminationReason::Rejected);
            }
            return LoopControl::Continue;
        }
    };

    match client_message {
        ClientMessage::ClientInfo(_) => {
            let e = RelayError::DuplicateRoleAnnouncement {
                session_id: ctx.session_id,
                role: ctx.role,
            };
            warn!(error = %e, "closing session");
            ctx.close_frame = Some(CloseFrame {
                code: close_code::POLICY,
                reason: "duplicate role announcement".into(),
            });
            LoopControl::Disconnect(TerminationReason::Rejected)
        }
        ClientMessage::RequestPresence => {
            let snapshot = ctx.hub.lock().await.presence_snapshot();
            let msg = ServerMessage::PresenceUpdate(PresenceUpdateDto::from(snapshot));
            reply(socket, &msg, ctx).await
        }
        ClientMessage::ScanEvent(dto) => {
            // Lock scope ends before the reply is written.
            let routed = ctx.hub.lock().await.route_scan(&ctx.session_id, dto.into());
            match routed {
                Ok(delivery) => {
                    let msg = ServerMessage::ScanDelivered(ScanDeliveredDto::from(delivery));
                    reply(socket, &msg, ctx).await
                }
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "scan from unregistered session");
                    LoopControl::Disconnect(TerminationReason::Closed)
                }
                Err(e) => {
                    debug!(error = %e, "scan rejected");
                    let msg = ServerMessage::ScanRejected(ScanRejectedDto {
                        reason: e.to_string(),
                    });
                    reply(socket, &msg, ctx).await
                }
            }
        }
        ClientMessage::Heartbeat => {
            let recorded = ctx
                .hub
                .lock()
                .await
                .record_heartbeat(&ctx.session_id, Instant::now());
            match recorded {
                Ok(()) => reply(socket, &ServerMessage::HeartbeatAck, ctx).await,
                Err(e) => {
                    // The reaper got here first; the Terminate message may still be queued.
                    warn!(error = %e, "heartbeat for expired session");
                    LoopControl::Disconnect(TerminationReason::HeartbeatTimeout)
                }
            }
        }
    }
}

async fn forward_outbound(
    socket: &mut WebSocket,
    outbound: Option<Outbound>,
    ctx: &mut ConnCtx,
) -> LoopControl {
    match outbound {
        Some(Outbound::Presence(snapshot)) => {
            let msg = ServerMessage::PresenceUpdate(PresenceUpdateDto::from(snapshot));
            reply(socket, &msg, ctx).await
        }
        Some(Outbound::Scan(event)) => {
            let msg = ServerMessage::ScanEvent(ScanEventDto::from(&event));
            reply(socket, &msg, ctx).await
        }
        Some(Outbound::Terminate(reason)) => {
            ctx.close_frame = Some(CloseFrame {
                code: close_code::POLICY,
                reason: reason.as_str().into(),
            });
            info!(reason = reason.as_str(), "session terminated by hub");
            LoopControl::Disconnect(reason)
        }
        None => {
            // The hub dropped our handle without a Terminate (queue was full).
            info!("session removed from hub");
            LoopControl::Disconnect(TerminationReason::HeartbeatTimeout)
        }
    }
}

async fn reply(socket: &mut WebSocket, msg: &ServerMessage, ctx: &mut ConnCtx) -> LoopControl {
    match send_message(socket, msg).await {
        Ok(bytes) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += bytes as u64;
            LoopControl::Continue
        }
        Err(err) => {
            // Log unexpected send failures; disconnect will follow immediately.
            warn!(error = ?err, "failed to send message");
            LoopControl::Disconnect(TerminationReason::Closed)
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket.send(Message::Text(txt.into())).await?;
    Ok(bytes)
}

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await?;
    socket.close().await.map_err(NetError::Ws)
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn disconnect_cleanup(ctx: &mut ConnCtx, reason: TerminationReason) {
    // No-op when the hub already removed the session (heartbeat timeout).
    let _ = ctx
        .hub
        .lock()
        .await
        .unregister_session(&ctx.session_id, reason);

    debug!(
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        "connection stats"
    );
    info!(reason = reason.as_str(), "client disconnected");
}
