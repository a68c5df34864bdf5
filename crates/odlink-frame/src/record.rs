//! Flat-file record streams.
//!
//! A recording is a plain concatenation of wire frames with no index or
//! footer; readers decode sequentially from the start.

use std::io::{ErrorKind, Read, Write};

use bytes::{Bytes, BytesMut};
use prost::Message;

use crate::codec::{encode_frame, encode_raw_frame, split_frame};
use crate::container::Container;
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Appends wire frames to any `Write` sink.
pub struct RecordWriter<W> {
    inner: W,
    buf: BytesMut,
}

impl<W: Write> RecordWriter<W> {
    /// Wrap a sink in a record writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
        }
    }

    /// Frame and append a container.
    pub fn write_container(&mut self, container: &Container) -> Result<()> {
        self.buf.clear();
        encode_frame(container, &mut self.buf)?;
        self.write_buffered()
    }

    /// Frame and append already-serialized container bytes verbatim.
    pub fn write_raw(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_raw_frame(payload, &mut self.buf)?;
        self.write_buffered()
    }

    /// Consume the writer and return the inner sink.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => {
                    return Err(FrameError::Io(std::io::Error::new(
                        ErrorKind::WriteZero,
                        "sink accepted no bytes",
                    )))
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

/// One frame read back from a recording.
///
/// Keeps the verbatim serialized-container bytes alongside the decoded
/// container so replay can republish byte-exactly.
#[derive(Debug, Clone)]
pub struct RecordedFrame {
    pub container: Container,
    pub payload: Bytes,
}

/// Reads consecutive wire frames from any `Read` source.
#[derive(Debug)]
pub struct RecordReader<R> {
    inner: R,
    buf: BytesMut,
    eof: bool,
}

impl<R: Read> RecordReader<R> {
    /// Wrap a source in a record reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            eof: false,
        }
    }

    /// Read the next recorded frame.
    ///
    /// Returns `Ok(None)` at a clean end of file; EOF in the middle of
    /// a frame is `FrameError::TruncatedRecord`. Corrupt header bytes
    /// fail the stream (`BadMagic`); a recording has no datagram
    /// boundaries to resynchronize on.
    pub fn next_frame(&mut self) -> Result<Option<RecordedFrame>> {
        loop {
            if let Some(payload) = split_frame(&mut self.buf)? {
                let container = Container::decode(payload.clone())?;
                return Ok(Some(RecordedFrame { container, payload }));
            }

            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::TruncatedRecord);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };
            if read == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..read]);
            }
        }
    }
}
