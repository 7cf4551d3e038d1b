use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::errors::CaptureError;
use crate::domain::scan::{FrameOutcome, ScanEvent};

// The adapters depend on these traits, not on the concrete transport or camera.

/// Whether an outbound message made it into the send queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Queued,
    // Not connected (or queue full); scans are a live stream and are not buffered.
    Dropped,
}

/// Port for emitting scans towards the relay.
pub trait ScanPublisher: Send + Sync {
    fn publish(&self, event: ScanEvent) -> PublishOutcome;

    /// Increments on every successful (re)connection; each value is a new server session.
    fn connection_epoch(&self) -> u64;
}

impl<T: ScanPublisher + ?Sized> ScanPublisher for Arc<T> {
    fn publish(&self, event: ScanEvent) -> PublishOutcome {
        (**self).publish(event)
    }

    fn connection_epoch(&self) -> u64 {
        (**self).connection_epoch()
    }
}

/// Port for the camera + decoder capability.
///
/// `next_frame` yields one decode attempt per frame and `Ok(None)` once the
/// stream has ended. A failing input surfaces as an error and leaves the
/// source inactive. `stop` must be safe to call in any state.
#[async_trait]
pub trait CaptureSource: Send {
    async fn start(&mut self) -> Result<(), CaptureError>;
    async fn next_frame(&mut self) -> Result<Option<FrameOutcome>, CaptureError>;
    async fn stop(&mut self);
    fn is_active(&self) -> bool;
}

/// Port for presenting relayed scans on a consumer.
pub trait ScanSink: Send + Sync {
    fn deliver(&self, event: &ScanEvent);
}
