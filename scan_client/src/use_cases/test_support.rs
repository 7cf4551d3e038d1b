// Hand-written fakes for the domain ports.

use crate::domain::{
    CaptureError, CaptureSource, FrameOutcome, PublishOutcome, ScanEvent, ScanPublisher,
    ScanSink,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct RecordingPublisher {
    events: Mutex<Vec<ScanEvent>>,
    epoch: AtomicU64,
    outcome: PublishOutcome,
}

impl RecordingPublisher {
    pub fn connected() -> Self {
        Self::with_outcome(PublishOutcome::Queued)
    }

    pub fn disconnected() -> Self {
        Self::with_outcome(PublishOutcome::Dropped)
    }

    fn with_outcome(outcome: PublishOutcome) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            epoch: AtomicU64::new(1),
            outcome,
        }
    }

    pub fn reconnect(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().expect("publisher mutex poisoned").clone()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.payload).collect()
    }
}

impl ScanPublisher for RecordingPublisher {
    fn publish(&self, event: ScanEvent) -> PublishOutcome {
        self.events
            .lock()
            .expect("publisher mutex poisoned")
            .push(event);
        self.outcome
    }

    fn connection_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

pub struct ScriptedCapture {
    frames: VecDeque<FrameOutcome>,
    start_error: Option<String>,
    read_error: Option<std::io::ErrorKind>,
    hold_open: bool,
    active: bool,
    stop_calls: usize,
}

impl ScriptedCapture {
    pub fn new(frames: Vec<FrameOutcome>) -> Self {
        Self {
            frames: frames.into(),
            start_error: None,
            read_error: None,
            hold_open: false,
            active: false,
            stop_calls: 0,
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            start_error: Some(reason.to_string()),
            ..Self::new(Vec::new())
        }
    }

    // Once the script runs out, keep the stream open instead of ending it.
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    // Once the script runs out, fail the next read with `kind`.
    pub fn failing_with(mut self, kind: std::io::ErrorKind) -> Self {
        self.read_error = Some(kind);
        self
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl CaptureSource for ScriptedCapture {
    async fn start(&mut self) -> Result<(), CaptureError> {
        if let Some(reason) = &self.start_error {
            return Err(CaptureError::Unavailable(reason.clone()));
        }
        self.active = true;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<FrameOutcome>, CaptureError> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        if let Some(kind) = self.read_error.take() {
            self.active = false;
            return Err(CaptureError::Io(std::io::Error::new(kind, "scripted read failure")));
        }
        if self.hold_open {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }

    async fn stop(&mut self) {
        self.active = false;
        self.stop_calls += 1;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ScanEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

impl ScanSink for RecordingSink {
    fn deliver(&self, event: &ScanEvent) {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(event.clone());
    }
}
