//! Statistics and metrics for camera streams

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::capture::CaptureStats;
use crate::transcode::TranscodeStats;

/// Achieved frame rate, measured over fixed-size frame windows
///
/// Reports the target rate until the first window completes, then the rate
/// measured over the most recent full window.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    /// Frames per measurement window
    window: u32,
    /// Frames counted in the current window
    frames: u32,
    /// Start of the current window
    window_start: Instant,
    /// Last computed rate
    fps: f64,
}

impl FpsMeter {
    /// Create a meter that starts out reporting `initial_fps`
    pub fn new(window: u32, initial_fps: f64) -> Self {
        Self {
            window: window.max(1),
            frames: 0,
            window_start: Instant::now(),
            fps: initial_fps,
        }
    }

    /// Record one frame captured at `now`
    ///
    /// Returns the new rate when a window completes.
    pub fn record(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        if self.frames < self.window {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed > Duration::ZERO {
            self.fps = f64::from(self.frames) / elapsed.as_secs_f64();
        }
        self.frames = 0;
        self.window_start = now;
        Some(self.fps)
    }

    /// Current rate estimate
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Restart measurement from `now`
    pub fn reset(&mut self, now: Instant, initial_fps: f64) {
        self.frames = 0;
        self.window_start = now;
        self.fps = initial_fps;
    }
}

/// Combined view of one streaming camera
#[derive(Debug, Clone, Serialize)]
pub struct CameraStats {
    /// Capture worker statistics
    pub capture: CaptureStats,
    /// Transcoder statistics, if a transcoder was started
    pub transcode: Option<TranscodeStats>,
    /// Where the transcoded stream is published
    pub output_url: String,
    /// Diagnostics from the last failed transcoder start
    pub transcode_error: Option<String>,
    /// Seconds since the camera was started
    pub uptime_secs: u64,
    /// Registered frame listeners
    pub listeners: usize,
    /// Live broadcast subscribers
    pub subscribers: usize,
}
