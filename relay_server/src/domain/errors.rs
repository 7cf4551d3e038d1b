use std::fmt;

use crate::domain::session::{Role, SessionId};

// Domain-level errors for relay workflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    // Role announcement named something other than producer/consumer.
    InvalidRole { role: String },
    // Session tried to announce a role a second time.
    DuplicateRoleAnnouncement { session_id: SessionId, role: Role },
    // Session is not (or no longer) registered with the hub.
    UnknownSession { session_id: SessionId },
    // Only producer sessions may emit scans.
    NotProducer { session_id: SessionId },
    EmptyPayload,
    PayloadTooLarge { len: usize, max: usize },
}

impl RelayError {
    /// Returns true when the error must tear down the offending connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidRole { .. }
                | RelayError::DuplicateRoleAnnouncement { .. }
                | RelayError::UnknownSession { .. }
        )
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::InvalidRole { role } => write!(f, "invalid role: {role:?}"),
            RelayError::DuplicateRoleAnnouncement { session_id, role } => {
                write!(f, "session {session_id} already announced role {role}")
            }
            RelayError::UnknownSession { session_id } => write!(f, "unknown session {session_id}"),
            RelayError::NotProducer { session_id } => {
                write!(f, "session {session_id} is not a producer")
            }
            RelayError::EmptyPayload => write!(f, "payload is required"),
            RelayError::PayloadTooLarge { len, max } => {
                write!(f, "payload too large ({len} bytes, max {max})")
            }
        }
    }
}

impl std::error::Error for RelayError {}
