// Domain layer: scan values, deduplication and the ports adapters plug into.

pub mod dedup;
pub mod errors;
pub mod ports;
pub mod scan;

pub use dedup::ScanDeduplicator;
pub use errors::{CaptureError, TransportError};
pub use ports::{CaptureSource, PublishOutcome, ScanPublisher, ScanSink};
pub use scan::{Detection, FrameOutcome, Role, ScanEvent};
