// Wire protocol DTOs and conversions for relay WebSocket messages.

use crate::domain::{PresenceSnapshot, Role, ScanEvent, SessionId, Symbology};
use crate::use_cases::ScanDelivery;
use serde::{Deserialize, Serialize};

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    // Confirms the role announcement and tells the client its session id.
    SessionInfo(SessionInfoDto),
    // Live consumer count for producers.
    PresenceUpdate(PresenceUpdateDto),
    // Delivery confirmation for the producer that emitted a scan.
    ScanDelivered(ScanDeliveredDto),
    // Scan that was refused before routing (not fatal).
    ScanRejected(ScanRejectedDto),
    HeartbeatAck,
    // Relayed scan for consumers.
    ScanEvent(ScanEventDto),
}

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    // Role announcement; must be the first message on a connection.
    ClientInfo(ClientInfoDto),
    RequestPresence,
    ScanEvent(ScanEventDto),
    Heartbeat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfoDto {
    pub role: String,
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEventDto {
    pub payload: String,
    #[serde(default = "unknown_symbology")]
    pub symbology: String,
    pub captured_at: u64,
}

fn unknown_symbology() -> String {
    Symbology::Unknown.as_str().to_string()
}

impl From<ScanEventDto> for ScanEvent {
    fn from(dto: ScanEventDto) -> Self {
        Self {
            payload: dto.payload,
            symbology: Symbology::from(dto.symbology.as_str()),
            captured_at: dto.captured_at,
        }
    }
}

impl From<&ScanEvent> for ScanEventDto {
    fn from(event: &ScanEvent) -> Self {
        Self {
            payload: event.payload.clone(),
            symbology: event.symbology.as_str().to_string(),
            captured_at: event.captured_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoDto {
    pub session_id: String,
    pub role: &'static str,
}

impl SessionInfoDto {
    pub fn new(session_id: SessionId, role: Role) -> Self {
        Self {
            session_id: session_id.to_string(),
            role: role.as_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdateDto {
    pub consumer_count: usize,
}

impl From<PresenceSnapshot> for PresenceUpdateDto {
    fn from(snapshot: PresenceSnapshot) -> Self {
        Self {
            consumer_count: snapshot.consumer_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDeliveredDto {
    pub delivered_to: usize,
}

impl From<ScanDelivery> for ScanDeliveredDto {
    fn from(delivery: ScanDelivery) -> Self {
        Self {
            delivered_to: delivery.delivered_to,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanRejectedDto {
    pub reason: String,
}
