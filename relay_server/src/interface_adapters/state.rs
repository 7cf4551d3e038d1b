use crate::use_cases::RelayHub;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Per-connection limits applied by the WebSocket adapter.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    // How long a new connection may stay silent before announcing its role.
    pub role_announce_timeout: Duration,
    // Capacity of each session's outbound queue.
    pub outbound_capacity: usize,
}

#[derive(Clone)]
pub struct AppState {
    // The only shared mutable resource; every session operation goes through it.
    pub hub: Arc<Mutex<RelayHub>>,
    pub connection: ConnectionSettings,
    // Process start, reported as uptime on the status endpoint.
    pub started_at: Instant,
}
