//! Error types for channels.

use thiserror::Error;

/// Outcome of trying to open a channel to the privileged process.
///
/// Reported to the bootstrap layer as-is; the engines never retry an open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    Success,
    /// The peer application is not installed.
    AppNotInstalled,
    /// The peer application exists but could not be started.
    AppUnavailable,
    /// The peer started but does not provide the service.
    ServiceUnavailable,
    /// The caller is not allowed to start or talk to the peer.
    NotAuthorized,
    Unknown,
}

impl ChannelStatus {
    pub fn is_success(&self) -> bool {
        *self == ChannelStatus::Success
    }

    /// Classify an I/O error raised while starting the peer.
    pub fn from_io_error(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => ChannelStatus::AppNotInstalled,
            std::io::ErrorKind::PermissionDenied => ChannelStatus::NotAuthorized,
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionRefused => ChannelStatus::ServiceUnavailable,
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted => {
                ChannelStatus::AppUnavailable
            }
            _ => ChannelStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ChannelStatus::Success => "success",
            ChannelStatus::AppNotInstalled => "peer application is not installed",
            ChannelStatus::AppUnavailable => "peer application is not available",
            ChannelStatus::ServiceUnavailable => "peer does not provide the service",
            ChannelStatus::NotAuthorized => "not authorized",
            ChannelStatus::Unknown => "unknown failure",
        };
        f.write_str(text)
    }
}

/// Errors that can occur on a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer is gone or the channel was closed.
    #[error("channel closed")]
    Closed,

    /// The channel could not be opened.
    #[error("channel open failed: {0}")]
    Open(ChannelStatus),

    /// A frame exceeded the maximum size.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// A frame did not contain a valid message.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// An I/O error occurred on the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
