use bytes::Bytes;

use crate::error::{MediaError, Result};

/// The reserved type-14 payload: a pointer into an externally owned
/// shared-memory pixel region.
///
/// Field numbers are part of the wire contract with producer processes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SharedImage {
    /// Channel name, resolved to a semaphore and segment key.
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub width: u32,
    #[prost(uint32, tag = "3")]
    pub height: u32,
    #[prost(uint32, tag = "4")]
    pub bytes_per_pixel: u32,
    /// Total pixel-buffer size in bytes.
    #[prost(uint32, tag = "5")]
    pub size: u32,
}

/// A dense row-major pixel buffer copied out of shared memory.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    data: Bytes,
}

impl PixelBuffer {
    /// Build a pixel buffer, validating that the data length matches
    /// the declared dimensions.
    pub fn new(width: u32, height: u32, bytes_per_pixel: u32, data: Bytes) -> Result<Self> {
        let expected = width as usize * height as usize * bytes_per_pixel as usize;
        if data.len() != expected {
            return Err(MediaError::SizeMismatch {
                got: data.len(),
                expected,
                width,
                height,
                bytes_per_pixel,
            });
        }
        Ok(Self {
            width,
            height,
            bytes_per_pixel,
            data,
        })
    }

    /// The raw pixel bytes, row-major, densely packed.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// One row of pixels, or `None` past the bottom edge.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.width as usize * self.bytes_per_pixel as usize;
        let start = y as usize * stride;
        Some(&self.data[start..start + stride])
    }
}
