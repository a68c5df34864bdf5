use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant, UNIX_EPOCH};

use odlink_frame::{RecordReader, TimeStamp};
use tracing::{debug, warn};

use crate::error::{NodeError, Result};

/// What a playback run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    /// Frames republished.
    pub frames: usize,
    /// Inter-frame gaps the player could not honor (already behind).
    pub behind_schedule: usize,
}

/// Replays a recording, preserving the original inter-message spacing.
///
/// `speed == 0` republishes as fast as the file can be read; any other
/// speed divides the original gaps. Payloads go out verbatim, byte for
/// byte, with their recorded timestamps untouched.
#[derive(Debug)]
pub struct Player<R> {
    reader: RecordReader<R>,
    speed: f64,
}

impl Player<File> {
    /// Open a recording file for playback.
    pub fn open(path: impl AsRef<Path>, speed: f64) -> Result<Self> {
        Self::from_reader(File::open(path)?, speed)
    }
}

impl<R: Read> Player<R> {
    /// Play back from any byte source.
    pub fn from_reader(source: R, speed: f64) -> Result<Self> {
        if !speed.is_finite() || speed < 0.0 {
            return Err(NodeError::InvalidSpeed { speed });
        }
        Ok(Self {
            reader: RecordReader::new(source),
            speed,
        })
    }

    /// Republish every recorded frame through `publish`.
    ///
    /// Falling behind schedule is a warning, not an error; playback
    /// continues best-effort and the summary counts the missed gaps.
    pub fn play<F>(mut self, mut publish: F) -> Result<PlaybackSummary>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut summary = PlaybackSummary::default();
        let mut last_sent: Option<Duration> = None;
        let mut last_wall = Instant::now();

        while let Some(frame) = self.reader.next_frame()? {
            if self.speed > 0.0 {
                let sent = sent_offset(frame.container.sent);
                if let Some(previous) = last_sent {
                    // Original spacing divided by speed, minus the time
                    // already spent reading; never waits when behind.
                    let gap = sent.saturating_sub(previous).div_f64(self.speed);
                    match gap.checked_sub(last_wall.elapsed()) {
                        Some(wait) => std::thread::sleep(wait),
                        None => {
                            summary.behind_schedule += 1;
                            warn!("cannot play at commanded speed");
                        }
                    }
                }
                last_sent = Some(sent);
                last_wall = Instant::now();
            }

            publish(&frame.payload)?;
            summary.frames += 1;
        }

        debug!(
            frames = summary.frames,
            behind = summary.behind_schedule,
            "playback finished"
        );
        Ok(summary)
    }
}

/// A recorded sent-stamp as an offset from the epoch; unstamped frames
/// replay without a gap.
fn sent_offset(sent: Option<TimeStamp>) -> Duration {
    sent.map_or(Duration::ZERO, |t| {
        t.to_system_time()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    })
}
