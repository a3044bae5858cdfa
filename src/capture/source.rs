//! Video source abstraction
//!
//! A [`SourceConnector`] opens a [`VideoSource`] for a URL. Reads are
//! blocking and only ever issued from one capture thread; `release` may be
//! called from any thread, including while a read is in flight, and must
//! make that read return promptly.

use std::sync::Arc;
use std::time::Duration;

use super::error::SourceError;
use super::frame::Frame;

/// Options applied when opening a source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOptions {
    /// Target frame rate
    pub target_fps: u32,
    /// Frames the source may buffer ahead of the reader
    pub buffer_frames: u32,
    /// Network I/O timeout; a stalled connection fails reads after this long
    pub io_timeout: Duration,
}

impl SourceOptions {
    /// Options for minimal latency at the given frame rate
    pub fn low_latency(target_fps: u32) -> Self {
        Self {
            target_fps: target_fps.max(1),
            buffer_frames: 1,
            io_timeout: Duration::from_secs(5),
        }
    }

    /// Interval between frames at the target rate
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }
}

/// An open video connection
pub trait VideoSource: Send + Sync {
    /// Read the next frame
    ///
    /// `Ok(None)` is a failed read (no frame available); `Err` is an
    /// unexpected fault. Both are counted as errors by the capture loop.
    fn read(&self) -> Result<Option<Frame>, SourceError>;

    /// Close the connection and free its resources
    ///
    /// Idempotent.
    fn release(&self);
}

/// Opens video sources
pub trait SourceConnector: Send + Sync {
    fn open(&self, url: &str, options: &SourceOptions) -> Result<Arc<dyn VideoSource>, SourceError>;
}
