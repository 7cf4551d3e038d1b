// Presentation boundary for consumers: one `symbology<TAB>payload` line per scan.

use crate::domain::{ScanEvent, ScanSink};
use std::io::{self, Stdout, Write};
use std::sync::{Mutex, PoisonError};

pub struct LineSink<W> {
    out: Mutex<W>,
}

impl LineSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ScanSink for LineSink<W> {
    fn deliver(&self, event: &ScanEvent) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = writeln!(out, "{}\t{}", event.symbology, event.payload).and_then(|_| out.flush());
        if let Err(e) = written {
            tracing::warn!(error = %e, "failed to write scan");
        }
    }
}
