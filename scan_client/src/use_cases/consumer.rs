// Consumer side: relayed scans -> presentation sink.

use crate::domain::{ScanEvent, ScanSink};
use std::sync::atomic::{AtomicU64, Ordering};

/// Forwards every relayed scan to a sink, in arrival order.
pub struct ConsumerAdapter<S> {
    sink: S,
    received: AtomicU64,
}

impl<S: ScanSink> ConsumerAdapter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            received: AtomicU64::new(0),
        }
    }

    pub fn on_scan(&self, event: &ScanEvent) {
        let count = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(symbology = %event.symbology, received = count, "scan received");
        self.sink.deliver(event);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
