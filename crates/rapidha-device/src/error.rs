use std::time::Duration;

use rapidha_frame::{EncodeError, FrameError};
use rapidha_transport::TransportError;

/// Errors that can occur in device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Transport-level error (opening or configuring the port).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level I/O error while writing.
    #[error("frame error: {0}")]
    Frame(FrameError),

    /// The command could not be encoded; nothing was written.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// No matching response arrived in time.
    #[error("no matching response after {0:?}")]
    Timeout(Duration),

    /// The byte stream ended or failed; no further frames will arrive.
    #[error("transport closed")]
    TransportClosed,

    /// The reader thread is already running.
    #[error("device already started")]
    AlreadyStarted,

    /// The reader thread is not running.
    #[error("device not started")]
    NotStarted,

    /// The reader thread panicked outside handler isolation.
    #[error("reader thread panicked")]
    ReaderPanicked,

    /// A response arrived but its payload could not be interpreted.
    #[error("unexpected {command} payload: {reason}")]
    UnexpectedResponse {
        command: &'static str,
        reason: &'static str,
    },
}

/// Coarse error category for callers that branch on outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    TransportClosed,
    Encode,
    Transport,
    Io,
    Lifecycle,
    Protocol,
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::Transport(_) => ErrorKind::Transport,
            DeviceError::Frame(_) => ErrorKind::Io,
            DeviceError::Encode(_) => ErrorKind::Encode,
            DeviceError::Timeout(_) => ErrorKind::Timeout,
            DeviceError::TransportClosed => ErrorKind::TransportClosed,
            DeviceError::AlreadyStarted
            | DeviceError::NotStarted
            | DeviceError::ReaderPanicked => ErrorKind::Lifecycle,
            DeviceError::UnexpectedResponse { .. } => ErrorKind::Protocol,
        }
    }

    /// True if retrying the same request may succeed.
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

impl From<FrameError> for DeviceError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Encode(encode) => DeviceError::Encode(encode),
            FrameError::ConnectionClosed => DeviceError::TransportClosed,
            other => DeviceError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_map_to_kinds() {
        let encode: DeviceError = FrameError::Encode(EncodeError::PayloadTooLarge {
            size: 300,
            max: 255,
        })
        .into();
        assert_eq!(encode.kind(), ErrorKind::Encode);

        let closed: DeviceError = FrameError::ConnectionClosed.into();
        assert_eq!(closed.kind(), ErrorKind::TransportClosed);

        let io: DeviceError =
            FrameError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).into();
        assert_eq!(io.kind(), ErrorKind::Io);
    }

    #[test]
    fn timeout_is_recoverable() {
        let err = DeviceError::Timeout(Duration::from_millis(500));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "no matching response after 500ms");
        assert!(!DeviceError::TransportClosed.is_timeout());
    }
}
