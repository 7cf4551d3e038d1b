/// Single-slot filter that stops a code held in front of the camera from being
/// re-sent on every frame.
///
/// Only the most recent payload is remembered. Moving the code out of frame
/// and back in (with another code seen in between) is a legitimate re-scan
/// and emits again. There is no time-based expiry: callers that need
/// "always emit" semantics call [`ScanDeduplicator::reset`].
#[derive(Debug, Default, Clone)]
pub struct ScanDeduplicator {
    last_payload: Option<String>,
}

impl ScanDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `payload` should be emitted, and remembers it.
    pub fn observe(&mut self, payload: &str) -> bool {
        if self.last_payload.as_deref() == Some(payload) {
            return false;
        }
        self.last_payload = Some(payload.to_string());
        true
    }

    /// Forgets the last payload so the next observation always emits.
    pub fn reset(&mut self) {
        self.last_payload = None;
    }

    pub fn last_payload(&self) -> Option<&str> {
        self.last_payload.as_deref()
    }
}
