//! Capture worker configuration

use std::time::Duration;

/// Consecutive failed reads tolerated before reconnecting
pub const DEFAULT_RECONNECT_THRESHOLD: u32 = 10;

/// Capture worker configuration options
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Reconnect once the consecutive error count exceeds this
    pub reconnect_threshold: u32,

    /// Pause between releasing a stalled source and reopening it
    pub reconnect_delay: Duration,

    /// Pause after a read raised an error
    pub error_backoff: Duration,

    /// How long `stop` waits for the capture thread to exit
    pub join_timeout: Duration,

    /// Frames per achieved-fps measurement window
    pub fps_window: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            reconnect_threshold: DEFAULT_RECONNECT_THRESHOLD,
            reconnect_delay: Duration::from_secs(2),
            error_backoff: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
            fps_window: 30,
        }
    }
}

impl CaptureConfig {
    /// Set the reconnect threshold
    pub fn reconnect_threshold(mut self, threshold: u32) -> Self {
        self.reconnect_threshold = threshold;
        self
    }

    /// Set the reconnect delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the error backoff
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Set the thread join timeout
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Set the fps measurement window
    pub fn fps_window(mut self, frames: u32) -> Self {
        self.fps_window = frames.max(1);
        self
    }
}
