// Live consumer set and synchronous presence notifications.

use crate::domain::{PresenceSnapshot, SessionId};
use std::collections::HashSet;

/// Listener invoked with the new snapshot whenever the consumer set changes size.
pub type PresenceListener = Box<dyn Fn(PresenceSnapshot) + Send + Sync>;

/// Tracks which sessions are live consumers.
///
/// The tracker is owned by the hub and mutated only alongside the hub's
/// session map, so the count always matches the consumer sessions it holds.
#[derive(Default)]
pub struct PresenceTracker {
    consumers: HashSet<SessionId>,
    listeners: Vec<PresenceListener>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot {
            consumer_count: self.consumers.len(),
        }
    }

    /// Registers a listener; each join/leave produces exactly one call.
    pub fn on_presence_change(&mut self, listener: PresenceListener) {
        self.listeners.push(listener);
    }

    /// Adds a consumer. Returns the new snapshot if the set changed.
    pub fn consumer_joined(&mut self, session_id: SessionId) -> Option<PresenceSnapshot> {
        if !self.consumers.insert(session_id) {
            return None;
        }
        Some(self.notify())
    }

    /// Removes a consumer. Returns the new snapshot if the set changed.
    pub fn consumer_left(&mut self, session_id: &SessionId) -> Option<PresenceSnapshot> {
        if !self.consumers.remove(session_id) {
            return None;
        }
        Some(self.notify())
    }

    pub fn consumers(&self) -> impl Iterator<Item = &SessionId> {
        self.consumers.iter()
    }

    fn notify(&self) -> PresenceSnapshot {
        let snapshot = self.snapshot();
        for listener in &self.listeners {
            listener(snapshot);
        }
        snapshot
    }
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker")
            .field("consumers", &self.consumers.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
