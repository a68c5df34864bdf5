/// Errors that can occur while framing or deframing containers.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header markers are not 0x0D 0xA4.
    #[error("bad frame magic (got {byte0:#04x} {byte1:#04x}, expected 0x0d 0xa4)")]
    BadMagic { byte0: u8, byte1: u8 },

    /// The serialized container exceeds the 24-bit length field.
    #[error("frame too large ({len} bytes, max {max})", max = crate::codec::MAX_PAYLOAD_LEN)]
    FrameTooLarge { len: usize },

    /// Resynchronization dropped more than the configured window in one recovery.
    #[error("lost frame synchronization ({dropped} bytes dropped)")]
    Desync { dropped: usize },

    /// A recorded file ended in the middle of a frame.
    #[error("truncated record (EOF inside a frame)")]
    TruncatedRecord,

    /// The framed bytes are not a valid serialized container.
    #[error("container decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
