/// Errors that can occur while fetching a shared-memory pixel buffer.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// The named semaphore could not be opened or operated on.
    #[error("semaphore {name:?} failed: {source}")]
    Semaphore {
        name: String,
        source: std::io::Error,
    },

    /// The shared-memory segment could not be located or attached.
    #[error("shared-memory segment (key {key:#010x}) failed: {source}")]
    Segment { key: i32, source: std::io::Error },

    /// The raw buffer does not match the declared image dimensions.
    #[error("pixel buffer size mismatch: got {got} bytes, expected {expected} ({width}x{height}x{bytes_per_pixel})")]
    SizeMismatch {
        got: usize,
        expected: usize,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
    },

    /// The descriptor payload is not a valid shared-image message.
    #[error("shared-image decode failed: {0}")]
    Decode(#[from] prost::DecodeError),
}

pub type Result<T> = std::result::Result<T, MediaError>;
