use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::codec::{split_frame, MAGIC0, MAGIC1};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Default maximum number of garbage bytes dropped in one recovery: 64 KiB.
pub const DEFAULT_RESYNC_WINDOW: usize = 64 * 1024;

/// Accumulates socket reads and extracts complete framed payloads.
///
/// A single datagram may carry several frames and a frame may span
/// several datagrams; callers feed raw reads in and pull complete
/// payloads out. On corrupt header bytes the reassembler scans forward
/// for the next marker pair instead of failing the stream, bounded by
/// `resync_window` per recovery.
pub struct Reassembler {
    buf: BytesMut,
    resync_window: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_RESYNC_WINDOW)
    }
}

impl Reassembler {
    /// Create a reassembler with an explicit resynchronization window.
    pub fn new(resync_window: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            resync_window,
        }
    }

    /// Append a socket read to the accumulation buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of buffered bytes not yet consumed by a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete framed payload, if any.
    ///
    /// Returns `Ok(None)` when more data is needed. Leading garbage is
    /// dropped up to the next `0x0D 0xA4` marker pair;
    /// `Err(FrameError::Desync)` reports a recovery that dropped more
    /// than the configured window, after which extraction may be
    /// retried on the remaining buffer.
    pub fn next_payload(&mut self) -> Result<Option<Bytes>> {
        let mut dropped = 0usize;
        loop {
            match split_frame(&mut self.buf) {
                Ok(Some(payload)) => {
                    if dropped > 0 {
                        warn!(dropped, "resynchronized after dropping garbage bytes");
                    }
                    return Ok(Some(payload));
                }
                Ok(None) => {
                    if dropped > 0 {
                        warn!(dropped, "dropped garbage bytes, waiting for next frame");
                    }
                    return Ok(None);
                }
                Err(FrameError::BadMagic { .. }) => {
                    dropped += self.drop_to_next_marker();
                    if dropped > self.resync_window {
                        return Err(FrameError::Desync { dropped });
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Drop buffered bytes up to the next marker pair and return how
    /// many were discarded. If no pair is found, keeps at most one
    /// trailing `0x0D` (a possibly split marker).
    fn drop_to_next_marker(&mut self) -> usize {
        let buf = &self.buf[..];
        for i in 1..buf.len().saturating_sub(1) {
            if buf[i] == MAGIC0 && buf[i + 1] == MAGIC1 {
                let _ = self.buf.split_to(i);
                return i;
            }
        }

        let keep = usize::from(self.buf.last() == Some(&MAGIC0));
        let discard = self.buf.len() - keep;
        let _ = self.buf.split_to(discard);
        discard
    }
}
