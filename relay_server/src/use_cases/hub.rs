// Relay hub: owns the session set, routes scans and broadcasts presence.

use crate::domain::{
    PresenceSnapshot, RelayError, Role, ScanEvent, Session, SessionId, SessionState,
    TerminationReason,
};
use crate::use_cases::presence::{PresenceListener, PresenceTracker};
use crate::use_cases::types::{Outbound, RelayStats, ScanDelivery, SessionHandle};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

const LOG_THROTTLE: Duration = Duration::from_secs(2);

struct SessionEntry {
    session: Session,
    handle: SessionHandle,
}

/// Registry of live sessions.
///
/// All mutation goes through `&mut self`; callers serialize access (the
/// server keeps the hub behind a single mutex). Delivery uses `try_send`, so
/// no method ever waits on a slow connection.
pub struct RelayHub {
    sessions: HashMap<SessionId, SessionEntry>,
    presence: PresenceTracker,
    scans_routed: u64,
    scans_delivered: u64,
    last_queue_full_log: Option<Instant>,
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayHub {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            presence: PresenceTracker::new(),
            scans_routed: 0,
            scans_delivered: 0,
            last_queue_full_log: None,
        }
    }

    /// Registers a session after its role announcement.
    ///
    /// A consumer triggers a presence broadcast to every producer; a producer
    /// is sent the current presence snapshot right away.
    pub fn register_session(
        &mut self,
        session_id: SessionId,
        role: Role,
        handle: SessionHandle,
        now: Instant,
    ) -> Result<Session, RelayError> {
        if let Some(existing) = self.sessions.get(&session_id) {
            return Err(RelayError::DuplicateRoleAnnouncement {
                session_id,
                role: existing.session.role,
            });
        }

        let session = Session::new(session_id, role, now);
        self.sessions.insert(
            session_id,
            SessionEntry {
                session: session.clone(),
                handle,
            },
        );
        info!(%session_id, %role, "session registered");

        match role {
            Role::Consumer => {
                if let Some(snapshot) = self.presence.consumer_joined(session_id) {
                    self.broadcast_presence(snapshot);
                }
            }
            Role::Producer => {
                let snapshot = self.presence.snapshot();
                self.push(&session_id, Outbound::Presence(snapshot));
            }
        }

        Ok(session)
    }

    /// Removes a session. Returns the terminated session if it was registered.
    ///
    /// Removing a consumer broadcasts the new count to the remaining
    /// producers. For reasons other than an explicit close, the connection
    /// task is told to shut down.
    pub fn unregister_session(
        &mut self,
        session_id: &SessionId,
        reason: TerminationReason,
    ) -> Option<Session> {
        let entry = self.sessions.remove(session_id)?;
        let mut session = entry.session;
        session.state = SessionState::Terminated(reason);

        if reason != TerminationReason::Closed {
            // Dropping the handle right after closes the channel even if this send fails.
            let _ = entry.handle.try_send(Outbound::Terminate(reason));
        }

        if session.role == Role::Consumer {
            if let Some(snapshot) = self.presence.consumer_left(session_id) {
                self.broadcast_presence(snapshot);
            }
        }

        info!(
            %session_id,
            role = %session.role,
            reason = reason.as_str(),
            "session unregistered"
        );
        Some(session)
    }

    /// Refreshes the liveness timestamp of a session.
    pub fn record_heartbeat(
        &mut self,
        session_id: &SessionId,
        now: Instant,
    ) -> Result<(), RelayError> {
        let entry = self
            .sessions
            .get_mut(session_id)
            .ok_or(RelayError::UnknownSession {
                session_id: *session_id,
            })?;
        entry.session.last_heartbeat_at = now;
        Ok(())
    }

    /// Drops every session whose heartbeat has been silent for longer than `grace`.
    pub fn reap_expired(&mut self, now: Instant, grace: Duration) -> Vec<Session> {
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|entry| entry.session.is_expired(now, grace))
            .map(|entry| entry.session.session_id)
            .collect();

        expired
            .iter()
            .filter_map(|session_id| {
                warn!(%session_id, "heartbeat timeout");
                self.unregister_session(session_id, TerminationReason::HeartbeatTimeout)
            })
            .collect()
    }

    /// Delivers a scan to every consumer connected right now.
    ///
    /// An empty audience is not an error: the result is `delivered_to: 0`.
    pub fn route_scan(
        &mut self,
        producer_id: &SessionId,
        event: ScanEvent,
    ) -> Result<ScanDelivery, RelayError> {
        let producer = self
            .sessions
            .get(producer_id)
            .ok_or(RelayError::UnknownSession {
                session_id: *producer_id,
            })?;
        if producer.session.role != Role::Producer {
            return Err(RelayError::NotProducer {
                session_id: *producer_id,
            });
        }
        event.validate()?;

        let recipients: Vec<SessionId> = self.presence.consumers().copied().collect();
        let mut delivered_to = 0;
        for consumer_id in &recipients {
            if self.push(consumer_id, Outbound::Scan(event.clone())) {
                delivered_to += 1;
            }
        }

        self.scans_routed += 1;
        self.scans_delivered += delivered_to as u64;

        if delivered_to == 0 {
            info!(
                producer_id = %producer_id,
                symbology = %event.symbology,
                "no consumers connected; scan not delivered"
            );
        } else {
            info!(
                producer_id = %producer_id,
                symbology = %event.symbology,
                delivered_to,
                "scan relayed"
            );
        }

        Ok(ScanDelivery { delivered_to })
    }

    pub fn current_consumer_count(&self) -> usize {
        self.presence.current_consumer_count()
    }

    pub fn presence_snapshot(&self) -> PresenceSnapshot {
        self.presence.snapshot()
    }

    /// Registers a synchronous listener for consumer join/leave.
    pub fn on_presence_change(&mut self, listener: PresenceListener) {
        self.presence.on_presence_change(listener);
    }

    pub fn session(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id).map(|entry| &entry.session)
    }

    pub fn stats(&self) -> RelayStats {
        let producers = self
            .sessions
            .values()
            .filter(|entry| entry.session.role == Role::Producer)
            .count();
        RelayStats {
            producers,
            consumers: self.presence.current_consumer_count(),
            scans_routed: self.scans_routed,
            scans_delivered: self.scans_delivered,
        }
    }

    fn broadcast_presence(&mut self, snapshot: PresenceSnapshot) {
        let producers: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|entry| entry.session.role == Role::Producer)
            .map(|entry| entry.session.session_id)
            .collect();

        debug!(
            consumer_count = snapshot.consumer_count,
            producers = producers.len(),
            "broadcasting presence"
        );
        for producer_id in &producers {
            self.push(producer_id, Outbound::Presence(snapshot));
        }
    }

    // Returns true when the message was queued for the session.
    fn push(&mut self, session_id: &SessionId, message: Outbound) -> bool {
        let Some(entry) = self.sessions.get(session_id) else {
            return false;
        };
        match entry.handle.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if self.should_log_queue_full() {
                    warn!(%session_id, "session outbound queue full; dropping message");
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%session_id, "session outbound queue closed");
                false
            }
        }
    }

    fn should_log_queue_full(&mut self) -> bool {
        let now = Instant::now();
        match self.last_queue_full_log {
            Some(last) if now.duration_since(last) < LOG_THROTTLE => false,
            _ => {
                self.last_queue_full_log = Some(now);
                true
            }
        }
    }
}

impl std::fmt::Debug for RelayHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHub")
            .field("sessions", &self.sessions.len())
            .field("presence", &self.presence)
            .field("scans_routed", &self.scans_routed)
            .finish()
    }
}
