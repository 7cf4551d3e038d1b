// Line-oriented capture source for terminals and keyboard-wedge scanners.

use crate::domain::{CaptureError, CaptureSource, Detection, FrameOutcome};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

/// Treats each input line as one decoded frame.
///
/// Line format is `SYMBOLOGY<TAB>payload` or just `payload`; a blank line is
/// a frame with nothing decodable, and so is a line that is not valid UTF-8.
/// End of input ends the stream; a read failure is reported as
/// `CaptureError::Io`.
pub struct LineCaptureSource<R> {
    reader: R,
    default_symbology: Option<String>,
    active: bool,
    ended: bool,
    line: Vec<u8>,
}

impl LineCaptureSource<BufReader<Stdin>> {
    pub fn stdin(default_symbology: Option<String>) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), default_symbology)
    }
}

impl<R> LineCaptureSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, default_symbology: Option<String>) -> Self {
        Self {
            reader,
            default_symbology,
            active: false,
            ended: false,
            line: Vec::new(),
        }
    }

    fn parse_line(&self, line: &str) -> FrameOutcome {
        if line.trim().is_empty() {
            return FrameOutcome::Undecoded;
        }
        match line.split_once('\t') {
            Some((tag, payload)) if !tag.trim().is_empty() && !payload.is_empty() => {
                FrameOutcome::Detected(Detection::new(payload, Some(tag.trim().to_string())))
            }
            _ => FrameOutcome::Detected(Detection::new(line, self.default_symbology.clone())),
        }
    }
}

#[async_trait]
impl<R> CaptureSource for LineCaptureSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn start(&mut self) -> Result<(), CaptureError> {
        if self.ended {
            return Err(CaptureError::Unavailable("capture input already ended".into()));
        }
        self.active = true;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<FrameOutcome>, CaptureError> {
        if !self.active {
            return Ok(None);
        }

        self.line.clear();
        match self.reader.read_until(b'\n', &mut self.line).await {
            Ok(0) => {
                self.ended = true;
                self.active = false;
                Ok(None)
            }
            Ok(_) => match std::str::from_utf8(&self.line) {
                Ok(line) => Ok(Some(self.parse_line(line.trim_end_matches(['\r', '\n'])))),
                Err(e) => {
                    tracing::debug!(error = %e, "capture line is not valid utf-8");
                    Ok(Some(FrameOutcome::Undecoded))
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "capture input failed");
                self.ended = true;
                self.active = false;
                Err(CaptureError::Io(e))
            }
        }
    }

    async fn stop(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
