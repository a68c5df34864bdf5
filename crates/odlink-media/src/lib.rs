//! Shared-memory media channel for out-of-band pixel buffers.
//!
//! Large binary payloads (camera frames) do not travel on the
//! conference; the wire only carries a [`SharedImage`] descriptor
//! pointing into a shared-memory segment owned by the producer
//! process. This crate resolves the descriptor's channel name to the
//! producer's named semaphore and SysV segment and copies the pixels
//! out under the semaphore.

pub mod error;
pub mod image;
pub mod naming;

#[cfg(unix)]
pub mod sysv;

pub use error::{MediaError, Result};
pub use image::{PixelBuffer, SharedImage};
pub use naming::{canonical_name, segment_key, MAX_NAME_LEN};

#[cfg(unix)]
pub use sysv::{MediaChannel, SysvMediaChannel, SEGMENT_HEADER_LEN};
