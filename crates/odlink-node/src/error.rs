use odlink_frame::FrameError;
use odlink_media::MediaError;
use odlink_transport::TransportError;

/// Errors that can occur in the conference node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The registered decoder rejected the payload bytes.
    #[error("decoder rejected payload for message type {id}")]
    DecodeMismatch { id: i32 },

    /// The dispatch queue was full and the container was shed.
    #[error("dispatch queue full, container dropped (type {id})")]
    QueueFull { id: i32 },

    /// The node's receive and worker threads are already running.
    #[error("node already started")]
    AlreadyStarted,

    /// The dispatch engine no longer accepts containers.
    #[error("node is shut down")]
    ShutDown,

    /// Playback speed must be zero or positive.
    #[error("invalid playback speed {speed}")]
    InvalidSpeed { speed: f64 },

    /// A framing error from the wire or a recording.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A conference socket error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A shared-memory media channel error.
    #[error(transparent)]
    Media(#[from] MediaError),

    /// An I/O error outside the framing layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;
