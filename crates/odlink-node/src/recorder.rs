use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use odlink_frame::{Container, RecordWriter};
use tracing::debug;

use crate::error::Result;

/// Appends containers to a flat recording file.
///
/// Repeated `create` calls on the same path keep appending; delete the
/// file for a fresh recording. The file handle is scoped to the
/// recorder and released on drop, on every path including write
/// failure.
pub struct Recorder {
    writer: RecordWriter<File>,
    path: PathBuf,
    frames: u64,
}

impl Recorder {
    /// Open `path` for appending, creating it if missing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        debug!(?path, "recording");
        Ok(Self {
            writer: RecordWriter::new(file),
            path,
            frames: 0,
        })
    }

    /// Frame and append one container.
    pub fn record(&mut self, container: &Container) -> Result<()> {
        self.writer.write_container(container)?;
        self.frames += 1;
        Ok(())
    }

    /// Frame and append already-serialized container bytes verbatim.
    pub fn record_raw(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.write_raw(payload)?;
        self.frames += 1;
        Ok(())
    }

    /// The recording path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames appended by this recorder instance.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
