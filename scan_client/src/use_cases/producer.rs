// Producer side: capture frames -> deduplicator -> publisher.

use crate::domain::scan::current_epoch_millis;
use crate::domain::{
    CaptureError, CaptureSource, Detection, FrameOutcome, PublishOutcome, ScanDeduplicator,
    ScanEvent, ScanPublisher,
};
use std::str::FromStr;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    // Keep decoding until shut down; repeats are suppressed by the deduplicator.
    #[default]
    Continuous,
    // Emit one scan, then stop scanning.
    SingleShot,
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(ScanMode::Continuous),
            "single" | "single_shot" | "single-shot" => Ok(ScanMode::SingleShot),
            other => Err(format!("unknown scan mode '{other}'")),
        }
    }
}

/// How a capture run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    // The capture stream ran out of frames.
    SourceEnded,
    // Single-shot mode emitted its scan.
    ScanCompleted(PublishOutcome),
    Shutdown,
}

/// Thin role adapter that turns decoded frames into published scans.
///
/// Deduplication state belongs to one server session: whenever the
/// publisher reports a new connection epoch the deduplicator is reset, so
/// the first payload after a reconnect always goes out.
pub struct ProducerAdapter<P> {
    publisher: P,
    dedup: ScanDeduplicator,
    mode: ScanMode,
    epoch: u64,
}

impl<P: ScanPublisher> ProducerAdapter<P> {
    pub fn new(publisher: P, mode: ScanMode) -> Self {
        let epoch = publisher.connection_epoch();
        Self {
            publisher,
            dedup: ScanDeduplicator::new(),
            mode,
            epoch,
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Feeds one detection through the deduplicator, stamped with the current time.
    /// Returns `None` when the payload was suppressed as a repeat.
    pub fn on_detection(&mut self, detection: Detection) -> Option<PublishOutcome> {
        self.on_detection_at(detection, current_epoch_millis())
    }

    pub fn on_detection_at(
        &mut self,
        detection: Detection,
        captured_at: u64,
    ) -> Option<PublishOutcome> {
        self.sync_epoch();

        if !self.dedup.observe(&detection.payload) {
            return None;
        }

        let event = ScanEvent::from_detection(detection, captured_at);
        let symbology = event.symbology.clone();
        let outcome = self.publisher.publish(event);
        match outcome {
            PublishOutcome::Queued => tracing::debug!(%symbology, "scan published"),
            PublishOutcome::Dropped => {
                tracing::warn!(%symbology, "scan dropped while disconnected; scan again")
            }
        }

        if self.mode == ScanMode::SingleShot {
            self.dedup.reset();
        }
        Some(outcome)
    }

    /// Drives `source` until it ends, shutdown is signalled, or a
    /// single-shot scan completes. The source is stopped on every exit path.
    pub async fn run<C>(
        &mut self,
        source: &mut C,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RunOutcome, CaptureError>
    where
        C: CaptureSource + ?Sized,
    {
        if let Err(e) = source.start().await {
            source.stop().await;
            tracing::error!(error = %e, "capture could not start");
            return Err(e);
        }

        let outcome = self.scan_frames(source, shutdown).await;
        source.stop().await;
        match &outcome {
            Ok(outcome) => tracing::info!(?outcome, "capture stopped"),
            Err(e) => tracing::error!(error = %e, "capture failed"),
        }
        outcome
    }

    async fn scan_frames<C>(
        &mut self,
        source: &mut C,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RunOutcome, CaptureError>
    where
        C: CaptureSource + ?Sized,
    {
        if *shutdown.borrow() {
            return Ok(RunOutcome::Shutdown);
        }

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    // A dropped sender also means nobody can keep us running.
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(RunOutcome::Shutdown);
                    }
                }

                frame = source.next_frame() => match frame? {
                    None => return Ok(RunOutcome::SourceEnded),
                    // Frames without a decodable symbol are normal.
                    Some(FrameOutcome::Undecoded) => {}
                    Some(FrameOutcome::Detected(detection)) => {
                        if let Some(outcome) = self.on_detection(detection)
                            && self.mode == ScanMode::SingleShot
                        {
                            return Ok(RunOutcome::ScanCompleted(outcome));
                        }
                    }
                },
            }
        }
    }

    fn sync_epoch(&mut self) {
        let current = self.publisher.connection_epoch();
        if current != self.epoch {
            tracing::debug!(from = self.epoch, to = current, "new relay session; dedup reset");
            self.epoch = current;
            self.dedup.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::test_support::{RecordingPublisher, ScriptedCapture};
    use std::sync::Arc;

    fn detected(payload: &str) -> FrameOutcome {
        FrameOutcome::Detected(Detection::new(payload, Some("QR_CODE".to_string())))
    }

    #[test]
    fn when_same_code_stays_in_frame_then_it_is_published_once() {
        let publisher = Arc::new(RecordingPublisher::connected());
        let mut adapter = ProducerAdapter::new(Arc::clone(&publisher), ScanMode::Continuous);

        for _ in 0..10 {
            adapter.on_detection(Detection::new("ABC123", None));
        }

        let payloads = publisher.payloads();
        assert_eq!(payloads, vec!["ABC123".to_string()]);
        assert_eq!(publisher.events()[0].symbology, "unknown");
    }

    #[test]
    fn when_publisher_reconnects_then_previous_payload_emits_again() {
        let publisher = Arc::new(RecordingPublisher::connected());
        let mut adapter = ProducerAdapter::new(Arc::clone(&publisher), ScanMode::Continuous);

        assert_eq!(
            adapter.on_detection(Detection::new("ABC123", None)),
            Some(PublishOutcome::Queued)
        );
        publisher.reconnect();

        assert_eq!(
            adapter.on_detection(Detection::new("ABC123", None)),
            Some(PublishOutcome::Queued)
        );
        assert_eq!(publisher.payloads().len(), 2);
    }

    #[test]
    fn when_publisher_drops_then_outcome_is_reported() {
        let publisher = Arc::new(RecordingPublisher::disconnected());
        let mut adapter = ProducerAdapter::new(Arc::clone(&publisher), ScanMode::Continuous);

        assert_eq!(
            adapter.on_detection(Detection::new("ABC123", None)),
            Some(PublishOutcome::Dropped)
        );
    }

    #[test]
    fn capture_time_is_stamped_on_the_event() {
        let publisher = Arc::new(RecordingPublisher::connected());
        let mut adapter = ProducerAdapter::new(Arc::clone(&publisher), ScanMode::Continuous);

        adapter.on_detection_at(Detection::new("ABC123", Some("CODE_128".into())), 1_234);

        let events = publisher.events();
        assert_eq!(events[0].captured_at, 1_234);
        assert_eq!(events[0].symbology, "CODE_128");
    }

    #[test]
    fn scan_mode_parses_env_values() {
        assert_eq!("continuous".parse::<ScanMode>(), Ok(ScanMode::Continuous));
        assert_eq!("Single".parse::<ScanMode>(), Ok(ScanMode::SingleShot));
        assert!("burst".parse::<ScanMode>().is_err());
    }

    #[tokio::test]
    async fn run_skips_undecoded_frames_and_stops_source_at_end() {
        let publisher = Arc::new(RecordingPublisher::connected());
        let mut adapter = ProducerAdapter::new(Arc::clone(&publisher), ScanMode::Continuous);
        let mut source = ScriptedCapture::new(vec![
            FrameOutcome::Undecoded,
            detected("A"),
            detected("A"),
            FrameOutcome::Undecoded,
            detected("B"),
            detected("A"),
        ]);
        let (_tx, mut shutdown) = watch::channel(false);

        let outcome = adapter
            .run(&mut source, &mut shutdown)
            .await
            .expect("capture should start");

        assert_eq!(outcome, RunOutcome::SourceEnded);
        assert_eq!(publisher.payloads(), vec!["A", "B", "A"]);
        assert_eq!(source.stop_calls(), 1);
        assert!(!source.is_active());
    }

    #[tokio::test]
    async fn single_shot_stops_after_first_emission() {
        let publisher = Arc::new(RecordingPublisher::connected());
        let mut adapter = ProducerAdapter::new(Arc::clone(&publisher), ScanMode::SingleShot);
        let mut source = ScriptedCapture::new(vec![detected("A"), detected("B")]);
        let (_tx, mut shutdown) = watch::channel(false);

        let outcome = adapter
            .run(&mut source, &mut shutdown)
            .await
            .expect("capture should start");

        assert_eq!(outcome, RunOutcome::ScanCompleted(PublishOutcome::Queued));
        assert_eq!(publisher.payloads(), vec!["A"]);
        assert_eq!(source.remaining(), 1);

        // The deduplicator was reset, so the next run emits the same code again.
        let mut again = ScriptedCapture::new(vec![detected("A")]);
        adapter
            .run(&mut again, &mut shutdown)
            .await
            .expect("capture should start");
        assert_eq!(publisher.payloads(), vec!["A", "A"]);
    }

    #[tokio::test]
    async fn capture_unavailable_is_surfaced_and_source_released() {
        let publisher = Arc::new(RecordingPublisher::connected());
        let mut adapter = ProducerAdapter::new(Arc::clone(&publisher), ScanMode::Continuous);
        let mut source = ScriptedCapture::unavailable("camera permission denied");
        let (_tx, mut shutdown) = watch::channel(false);

        let result = adapter.run(&mut source, &mut shutdown).await;

        assert!(matches!(result, Err(CaptureError::Unavailable(reason)) if reason == "camera permission denied"));
        assert_eq!(source.stop_calls(), 1);
        assert!(publisher.payloads().is_empty());
    }

    #[tokio::test]
    async fn capture_read_failure_is_surfaced_after_earlier_frames() {
        let publisher = Arc::new(RecordingPublisher::connected());
        let mut adapter = ProducerAdapter::new(Arc::clone(&publisher), ScanMode::Continuous);
        let mut source = ScriptedCapture::new(vec![detected("A"), FrameOutcome::Undecoded])
            .failing_with(std::io::ErrorKind::BrokenPipe);
        let (_tx, mut shutdown) = watch::channel(false);

        let result = adapter.run(&mut source, &mut shutdown).await;

        assert!(matches!(
            result,
            Err(CaptureError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe
        ));
        assert_eq!(publisher.payloads(), vec!["A"]);
        assert_eq!(source.stop_calls(), 1);
        assert!(!source.is_active());
    }

    #[tokio::test]
    async fn shutdown_signal_ends_an_open_stream() {
        let publisher = Arc::new(RecordingPublisher::connected());
        let mut adapter = ProducerAdapter::new(Arc::clone(&publisher), ScanMode::Continuous);
        let mut source = ScriptedCapture::new(vec![detected("A")]).held_open();
        let (tx, mut shutdown) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            tx.send_replace(true);
        });

        let outcome = adapter
            .run(&mut source, &mut shutdown)
            .await
            .expect("capture should start");
        stopper.await.expect("stopper task");

        assert_eq!(outcome, RunOutcome::Shutdown);
        assert_eq!(publisher.payloads(), vec!["A"]);
        assert_eq!(source.stop_calls(), 1);
    }
}
