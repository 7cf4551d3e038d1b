// Domain-level session, scan and presence types.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::domain::errors::RelayError;

/// Opaque, server-assigned identity of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Allocates a fresh identity; reconnects never reuse one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    // Scanning client (mobile) that emits scan events.
    Producer,
    // Desktop session that receives relayed scan events.
    Consumer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RelayError;

    // Legacy client names are still accepted: "mobile" scanners and "pc_client" desktops.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "producer" | "mobile" => Ok(Role::Producer),
            "consumer" | "pc_client" | "desktop" => Ok(Role::Consumer),
            other => Err(RelayError::InvalidRole {
                role: other.to_string(),
            }),
        }
    }
}

/// Barcode/QR encoding family reported by the decoder.
///
/// Tags the hub does not recognize are kept verbatim in `Other` so consumers
/// always see exactly what the producer sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Symbology {
    QrCode,
    Code128,
    Code39,
    Ean13,
    Ean8,
    Itf,
    UpcA,
    UpcE,
    #[default]
    Unknown,
    Other(String),
}

impl Symbology {
    pub fn as_str(&self) -> &str {
        match self {
            Symbology::QrCode => "QR_CODE",
            Symbology::Code128 => "CODE_128",
            Symbology::Code39 => "CODE_39",
            Symbology::Ean13 => "EAN_13",
            Symbology::Ean8 => "EAN_8",
            Symbology::Itf => "ITF",
            Symbology::UpcA => "UPC_A",
            Symbology::UpcE => "UPC_E",
            Symbology::Unknown => "unknown",
            Symbology::Other(tag) => tag,
        }
    }
}

impl From<&str> for Symbology {
    fn from(tag: &str) -> Self {
        match tag {
            "QR_CODE" => Symbology::QrCode,
            "CODE_128" => Symbology::Code128,
            "CODE_39" => Symbology::Code39,
            "EAN_13" => Symbology::Ean13,
            "EAN_8" => Symbology::Ean8,
            "ITF" => Symbology::Itf,
            "UPC_A" => Symbology::UpcA,
            "UPC_E" => Symbology::UpcE,
            "unknown" => Symbology::Unknown,
            other => Symbology::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded payload in flight from a producer to the consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub payload: String,
    pub symbology: Symbology,
    // Epoch milliseconds stamped by the producer.
    pub captured_at: u64,
}

impl ScanEvent {
    pub const MAX_PAYLOAD_LEN: usize = 4096;

    /// Checks the payload before it is allowed into the relay.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.payload.trim().is_empty() {
            return Err(RelayError::EmptyPayload);
        }
        if self.payload.len() > Self::MAX_PAYLOAD_LEN {
            return Err(RelayError::PayloadTooLarge {
                len: self.payload.len(),
                max: Self::MAX_PAYLOAD_LEN,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    // Connection open, role not announced yet.
    Connecting,
    Active,
    Terminated(TerminationReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Closed,
    HeartbeatTimeout,
    Rejected,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::Closed => "closed",
            TerminationReason::HeartbeatTimeout => "heartbeat timeout",
            TerminationReason::Rejected => "rejected",
        }
    }
}

/// One registered connection, owned by the relay hub.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub role: Role,
    pub connected_at: Instant,
    pub last_heartbeat_at: Instant,
    pub state: SessionState,
}

impl Session {
    pub fn new(session_id: SessionId, role: Role, now: Instant) -> Self {
        Self {
            session_id,
            role,
            connected_at: now,
            last_heartbeat_at: now,
            state: SessionState::Active,
        }
    }

    /// Returns true once the heartbeat has been silent for longer than `grace`.
    pub fn is_expired(&self, now: Instant, grace: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat_at) > grace
    }
}

/// Consumer presence as observed by producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub consumer_count: usize,
}
