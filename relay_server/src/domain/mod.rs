// Domain layer: sessions, scan events and relay errors.

pub mod errors;
pub mod session;

pub use errors::RelayError;
pub use session::{
    PresenceSnapshot, Role, ScanEvent, Session, SessionId, SessionState, Symbology,
    TerminationReason,
};
