// Wire protocol DTOs for the relay WebSocket, seen from the client side.

use crate::domain::{Role, ScanEvent};
use serde::{Deserialize, Serialize};

/// Messages the client sends to the relay.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    // Role announcement; sent first on every (re)connection.
    ClientInfo(ClientInfoDto),
    RequestPresence,
    ScanEvent(ScanEventDto),
    Heartbeat,
}

/// Messages the relay sends to the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionInfo(SessionInfoDto),
    PresenceUpdate(PresenceUpdateDto),
    ScanDelivered(ScanDeliveredDto),
    ScanRejected(ScanRejectedDto),
    HeartbeatAck,
    ScanEvent(ScanEventDto),
}

/// Inbound event names handlers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEventKind {
    SessionInfo,
    PresenceUpdate,
    ScanDelivered,
    ScanRejected,
    HeartbeatAck,
    ScanEvent,
}

impl ServerMessage {
    pub fn kind(&self) -> ServerEventKind {
        match self {
            ServerMessage::SessionInfo(_) => ServerEventKind::SessionInfo,
            ServerMessage::PresenceUpdate(_) => ServerEventKind::PresenceUpdate,
            ServerMessage::ScanDelivered(_) => ServerEventKind::ScanDelivered,
            ServerMessage::ScanRejected(_) => ServerEventKind::ScanRejected,
            ServerMessage::HeartbeatAck => ServerEventKind::HeartbeatAck,
            ServerMessage::ScanEvent(_) => ServerEventKind::ScanEvent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientInfoDto {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl ClientInfoDto {
    pub fn new(role: Role, platform: Option<String>) -> Self {
        Self {
            role: role.as_str().to_string(),
            platform,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEventDto {
    pub payload: String,
    #[serde(default = "unknown_symbology")]
    pub symbology: String,
    pub captured_at: u64,
}

fn unknown_symbology() -> String {
    ScanEvent::UNKNOWN_SYMBOLOGY.to_string()
}

impl From<&ScanEvent> for ScanEventDto {
    fn from(event: &ScanEvent) -> Self {
        Self {
            payload: event.payload.clone(),
            symbology: event.symbology.clone(),
            captured_at: event.captured_at,
        }
    }
}

impl From<ScanEventDto> for ScanEvent {
    fn from(dto: ScanEventDto) -> Self {
        Self {
            payload: dto.payload,
            symbology: dto.symbology,
            captured_at: dto.captured_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoDto {
    pub session_id: String,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdateDto {
    pub consumer_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDeliveredDto {
    pub delivered_to: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScanRejectedDto {
    pub reason: String,
}
