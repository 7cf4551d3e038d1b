use std::fmt;

// Errors surfaced by the transport session.
#[derive(Debug)]
pub enum TransportError {
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    ConnectTimeout,
    Serialization(serde_json::Error),
    // Retry budget spent without reaching the relay.
    RetriesExhausted { attempts: u32 },
    // The session was closed by its owner.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Ws(err) => write!(f, "websocket error: {err}"),
            TransportError::ConnectTimeout => write!(f, "connection attempt timed out"),
            TransportError::Serialization(err) => write!(f, "serialization error: {err}"),
            TransportError::RetriesExhausted { attempts } => {
                write!(f, "relay unreachable after {attempts} attempts")
            }
            TransportError::Closed => write!(f, "session closed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Ws(Box::new(err))
    }
}

// Errors from the capture/decoding boundary.
#[derive(Debug)]
pub enum CaptureError {
    // No camera, no permission, or the stream could not start.
    Unavailable(String),
    Io(std::io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Unavailable(reason) => write!(f, "capture unavailable: {reason}"),
            CaptureError::Io(err) => write!(f, "capture io error: {err}"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err)
    }
}
