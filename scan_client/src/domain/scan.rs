// Domain-level scan values shared by the producer and consumer adapters.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
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

impl FromStr for Role {
    type Err = String;

    // Accepts the legacy device names used by older deployments.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "producer" | "mobile" => Ok(Role::Producer),
            "consumer" | "pc_client" | "desktop" => Ok(Role::Consumer),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate decode from a single camera frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub payload: String,
    // None when the decoder cannot classify the symbol.
    pub symbology: Option<String>,
}

impl Detection {
    pub fn new(payload: impl Into<String>, symbology: Option<String>) -> Self {
        Self {
            payload: payload.into(),
            symbology,
        }
    }
}

/// Result of one decode attempt. Undecodable frames are normal, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Detected(Detection),
    Undecoded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub payload: String,
    pub symbology: String,
    // Epoch milliseconds at the producer.
    pub captured_at: u64,
}

impl ScanEvent {
    pub const UNKNOWN_SYMBOLOGY: &'static str = "unknown";

    pub fn from_detection(detection: Detection, captured_at: u64) -> Self {
        Self {
            payload: detection.payload,
            symbology: detection
                .symbology
                .unwrap_or_else(|| Self::UNKNOWN_SYMBOLOGY.to_string()),
            captured_at,
        }
    }
}

pub fn current_epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
