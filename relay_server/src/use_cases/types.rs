// Use-case level messages pushed from the hub to connection tasks.

use crate::domain::{PresenceSnapshot, ScanEvent, TerminationReason};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum Outbound {
    // Consumer count changed (or was requested) for a producer session.
    Presence(PresenceSnapshot),
    // Relayed scan for a consumer session.
    Scan(ScanEvent),
    // The hub dropped the session; the connection should close.
    Terminate(TerminationReason),
}

/// Handle the hub uses to reach a connection task.
pub type SessionHandle = mpsc::Sender<Outbound>;

/// Delivery confirmation echoed back to the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanDelivery {
    pub delivered_to: usize,
}

/// Aggregate counters reported on the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayStats {
    pub producers: usize,
    pub consumers: usize,
    pub scans_routed: u64,
    pub scans_delivered: u64,
}
